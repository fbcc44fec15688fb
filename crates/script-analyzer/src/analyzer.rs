use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::runtime::Handle;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::analysis::{AnalysisHandler, AnalysisQueue};
use crate::buffer::TextBuffer;
use crate::config::AnalyzerSettings;
use crate::diagnostics::DiagnosticsSink;
use crate::entry::{AnalysisEntry, EntryRegistry};
use crate::parse::buffer_tracker::BufferTracker;
use crate::parse::dispatcher::ParseDispatcher;
use crate::parse::Parser;

// ── Analyzer ────────────────────────────────────────────────────────────────

/// Centralized background parsing and analysis for a set of source files.
///
/// Owns the entry registry, the parse dispatcher, and the single-worker
/// analysis queue, and wires live buffers into the debounce machinery. All
/// collaborators are explicit constructor arguments; nothing here is
/// process-global.
///
/// Must be constructed inside a tokio runtime: change notifications may
/// arrive on arbitrary threads, so the captured runtime handle is what lets
/// them schedule timers and background parses.
pub struct Analyzer {
    registry: Arc<EntryRegistry>,
    dispatcher: Arc<ParseDispatcher>,
    queue: Arc<AnalysisQueue>,
    trackers: DashMap<PathBuf, Arc<BufferTracker>>,
    settings: AnalyzerSettings,
    runtime: Handle,
}

impl Analyzer {
    /// Build the pipeline around a host parser, analysis handler, and
    /// diagnostics sink.
    pub fn new(
        parser: Arc<dyn Parser>,
        handler: Arc<dyn AnalysisHandler>,
        sink: Arc<dyn DiagnosticsSink>,
        mut settings: AnalyzerSettings,
    ) -> Self {
        settings.normalize();
        let runtime = Handle::current();
        let registry = Arc::new(EntryRegistry::new());
        let queue = Arc::new(AnalysisQueue::new(handler));
        let dispatcher = Arc::new(ParseDispatcher::new(
            parser,
            sink,
            Arc::clone(&queue),
            runtime.clone(),
            settings.retry.clone(),
        ));

        Self {
            registry,
            dispatcher,
            queue,
            trackers: DashMap::new(),
            settings,
            runtime,
        }
    }

    /// Start monitoring a live buffer: subscribe to its change stream and
    /// kick off an initial parse. Idempotent per path: a second call for a
    /// buffer already being monitored does nothing beyond returning its
    /// entry.
    pub fn monitor_buffer(
        &self,
        buffer: Arc<dyn TextBuffer>,
    ) -> Arc<AnalysisEntry> {
        use dashmap::mapref::entry::Entry;

        let path = buffer.path().to_path_buf();
        let entry = self.registry.get_or_create(&path);

        let tracker = match self.trackers.entry(path.clone()) {
            Entry::Occupied(_) => {
                debug!("already monitoring {}", path.display());
                return entry;
            },
            Entry::Vacant(vacant) => {
                let tracker = Arc::new(BufferTracker::new(
                    Arc::clone(&entry),
                    Arc::clone(&self.dispatcher),
                    self.runtime.clone(),
                    Duration::from_millis(self.settings.debounce.quiet_window_ms),
                ));
                vacant.insert(Arc::clone(&tracker));
                tracker
            },
        };

        info!("monitoring {}", path.display());

        let listener_tracker = Arc::clone(&tracker);
        buffer.on_changed(Box::new(move |event| {
            listener_tracker.handle_change(event);
        }));

        tracker.request_immediate(buffer.current_snapshot());

        if self.settings.discovery.implicit_project {
            self.discover_siblings(&path);
        }

        entry
    }

    /// Schedule a one-shot background parse for a file without a live
    /// buffer. If the file turns out to be monitored, the request reparses
    /// the live snapshot instead; the buffer is fresher than the disk and
    /// the per-identity in-flight rule stays intact.
    pub fn analyze_file(
        &self,
        path: &Path,
    ) -> Arc<AnalysisEntry> {
        let entry = self.registry.get_or_create(path);
        if let Some(tracker) = self.trackers.get(path) {
            tracker.reparse_latest();
        } else {
            self.dispatcher.spawn_file_parse(Arc::clone(&entry), path.to_path_buf());
        }
        entry
    }

    /// Schedule background parses for a batch of files.
    pub fn analyze_files<I>(
        &self,
        paths: I,
    ) where
        I: IntoIterator<Item = PathBuf>,
    {
        for path in paths {
            self.analyze_file(&path);
        }
    }

    /// The tracked entry for `path`, if any parse has ever been requested
    /// for it.
    pub fn entry_for(
        &self,
        path: &Path,
    ) -> Option<Arc<AnalysisEntry>> {
        self.registry.get(path)
    }

    /// The shared registry, for consumers that want to enumerate tracked
    /// files.
    pub fn registry(&self) -> &Arc<EntryRegistry> {
        &self.registry
    }

    /// Stop tracking a file (editor close). Drops its debounce state and
    /// removes the registry entry; consumers must not hold on to it.
    pub fn close(
        &self,
        path: &Path,
    ) {
        if let Some((_, tracker)) = self.trackers.remove(path) {
            tracker.close();
        }
        if self.registry.remove(path).is_some() {
            info!("closed {}", path.display());
        }
    }

    /// Whether any parse is in flight or any analysis is pending or
    /// running. Used by shutdown sequencing and tests.
    pub fn is_busy(&self) -> bool {
        self.dispatcher.is_parsing() || self.queue.is_analyzing()
    }

    /// Stop the analysis worker. In-flight parses finish on their own but
    /// no further analysis runs. Idempotent.
    pub fn shutdown(&self) {
        self.queue.stop();
    }

    /// Schedule background parses for same-extension files next to a newly
    /// monitored buffer (single directory, non-recursive). Real cost on
    /// large directories, hence the settings toggle.
    fn discover_siblings(
        &self,
        opened: &Path,
    ) {
        let Some(extension) = opened.extension().map(|e| e.to_os_string()) else {
            return;
        };
        let Some(dir) = opened.parent().map(Path::to_path_buf) else {
            return;
        };
        let opened = opened.to_path_buf();
        let registry = Arc::clone(&self.registry);
        let dispatcher = Arc::clone(&self.dispatcher);

        self.runtime.spawn_blocking(move || {
            let mut found = 0usize;
            for entry in WalkDir::new(&dir)
                .max_depth(1)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
            {
                let path = entry.path();
                if path == opened || path.extension() != Some(extension.as_os_str()) {
                    continue;
                }
                let tracked = registry.get_or_create(path);
                dispatcher.spawn_file_parse(tracked, path.to_path_buf());
                found += 1;
            }
            debug!("discovered {found} sibling file(s) in {}", dir.display());
        });
    }
}

impl Drop for Analyzer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
