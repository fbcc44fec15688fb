use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

use crate::analysis::{AnalysisPriority, AnalysisQueue};
use crate::content::TextContent;
use crate::diagnostics::{DiagnosticsSink, Severity};
use crate::entry::AnalysisEntry;
use crate::error::PipelineError;
use crate::parse::buffer_tracker::BufferTracker;
use crate::parse::{ParseOutput, Parser};
use crate::config::RetrySettings;

// ── ParseDispatcher ─────────────────────────────────────────────────────────

/// Single-flight marker for a background file parse. A second request for
/// the same path while one is running flips `requeue` instead of spawning a
/// concurrent parse.
struct FileFlight {
    requeue: bool,
}

/// Runs the host parser on the blocking thread pool and commits results.
///
/// Buffer parses come from a [`BufferTracker`] (which already guarantees one
/// in flight per buffer); file parses are guarded here. Distinct identities
/// parse concurrently. Commits go through the entry's generation gate so a
/// superseded parse's late result is discarded instead of overwriting newer
/// state.
pub struct ParseDispatcher {
    parser: Arc<dyn Parser>,
    sink: Arc<dyn DiagnosticsSink>,
    queue: Arc<AnalysisQueue>,
    runtime: Handle,
    retry: RetrySettings,
    in_flight: Arc<AtomicUsize>,
    file_flights: DashMap<PathBuf, FileFlight>,
}

impl ParseDispatcher {
    pub(crate) fn new(
        parser: Arc<dyn Parser>,
        sink: Arc<dyn DiagnosticsSink>,
        queue: Arc<AnalysisQueue>,
        runtime: Handle,
        retry: RetrySettings,
    ) -> Self {
        Self {
            parser,
            sink,
            queue,
            runtime,
            retry,
            in_flight: Arc::new(AtomicUsize::new(0)),
            file_flights: DashMap::new(),
        }
    }

    /// Whether any parse task is still pending or running.
    pub fn is_parsing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Number of parse tasks pending or running.
    pub fn pending_parses(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Parse a live-buffer snapshot in the background.
    ///
    /// Commits only when the parse came back free of errors, so a broken
    /// intermediate edit never destroys the last usable tree. Diagnostics
    /// are published either way. `tracker.parse_completed` runs on every
    /// path, including parser panics.
    pub(crate) fn spawn_buffer_parse(
        &self,
        entry: Arc<AnalysisEntry>,
        content: TextContent,
        tracker: Arc<BufferTracker>,
    ) {
        let generation = entry.next_parse_generation();
        let parser = Arc::clone(&self.parser);
        let sink = Arc::clone(&self.sink);
        let queue = Arc::clone(&self.queue);
        let guard = InFlightGuard::acquire(&self.in_flight);

        self.runtime.spawn_blocking(move || {
            let _guard = guard;

            match run_parser(&parser, &content) {
                Ok(output) => {
                    let has_errors = output.diagnostics.iter().any(|d| d.severity == Severity::Error);

                    // Squiggles always reflect the newest parse, even when
                    // the tree commit is withheld.
                    sink.publish(content.path(), &output.diagnostics);

                    if has_errors {
                        debug!(
                            "parse of {} produced errors; keeping previous tree",
                            content.path().display()
                        );
                    } else if entry.commit_tree(output.tree, content.cookie(), generation) {
                        queue.enqueue(Arc::clone(&entry), AnalysisPriority::High);
                    }
                },
                Err(error) => warn!("{error}"),
            }

            tracker.parse_completed();
        });
    }

    /// Parse a file with no live buffer in the background.
    ///
    /// One in flight per path; a request arriving mid-parse coalesces into a
    /// rerun once the current round finishes. File parses always commit
    /// (there is no editor to preserve a "last good" experience for) and
    /// enqueue analysis at Normal priority.
    pub(crate) fn spawn_file_parse(
        self: &Arc<Self>,
        entry: Arc<AnalysisEntry>,
        path: PathBuf,
    ) {
        use dashmap::mapref::entry::Entry;

        match self.file_flights.entry(path.clone()) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().requeue = true;
                trace!("parse already in flight for {}, coalescing", path.display());
                return;
            },
            Entry::Vacant(vacant) => {
                vacant.insert(FileFlight {
                    requeue: false,
                });
            },
        }

        let generation = entry.next_parse_generation();
        let this = Arc::clone(self);
        let guard = InFlightGuard::acquire(&self.in_flight);

        self.runtime.spawn_blocking(move || {
            let _guard = guard;

            match read_with_retry(&path, &this.retry) {
                Ok(text) => {
                    let content = TextContent::File {
                        path: path.clone(),
                        text: text.into(),
                    };
                    match run_parser(&this.parser, &content) {
                        Ok(output) => {
                            if entry.commit_tree(output.tree, content.cookie(), generation) {
                                this.queue.enqueue(Arc::clone(&entry), AnalysisPriority::Normal);
                            }
                        },
                        Err(error) => warn!("{error}"),
                    }
                },
                Err(error) => warn!("{error}"),
            }

            let requeued = this
                .file_flights
                .remove(&path)
                .is_some_and(|(_, flight)| flight.requeue);
            if requeued {
                this.spawn_file_parse(entry, path);
            }
        });
    }
}

/// Decrements the in-flight counter when the parse task ends, however it
/// ends.
struct InFlightGuard {
    counter: Arc<AtomicUsize>,
}

impl InFlightGuard {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter: Arc::clone(counter),
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Invoke the external parser, containing any panic to this parse round.
fn run_parser(
    parser: &Arc<dyn Parser>,
    content: &TextContent,
) -> Result<ParseOutput, PipelineError> {
    std::panic::catch_unwind(AssertUnwindSafe(|| parser.parse(content))).map_err(|_| PipelineError::ParserPanic {
        path: content.path().to_path_buf(),
    })
}

/// Read a file, retrying transient failures (locked or mid-copy files) with
/// a fixed delay before giving up.
fn read_with_retry(
    path: &Path,
    retry: &RetrySettings,
) -> Result<String, PipelineError> {
    let mut last_error = None;
    for attempt in 0..retry.io_attempts {
        match std::fs::read_to_string(path) {
            Ok(text) => return Ok(text),
            Err(error) => {
                trace!(
                    "read of {} failed (attempt {}/{}): {error}",
                    path.display(),
                    attempt + 1,
                    retry.io_attempts
                );
                last_error = Some(error);
                if attempt + 1 < retry.io_attempts {
                    std::thread::sleep(Duration::from_millis(retry.io_delay_ms));
                }
            },
        }
    }

    Err(PipelineError::FileRead {
        path: path.to_path_buf(),
        attempts: retry.io_attempts,
        source: last_error.unwrap_or_else(|| std::io::Error::other("no attempts made")),
    })
}

#[cfg(test)]
#[path = "../../tests/src/parse/dispatcher_tests.rs"]
mod tests;
