use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::content::Cookie;
use crate::parse::SyntaxTree;

// ── AnalysisEntry ───────────────────────────────────────────────────────────

/// Observer invoked synchronously on the thread that produced the event.
/// Consumers needing UI-thread affinity marshal themselves.
pub type EntryObserver = Box<dyn Fn(&Arc<AnalysisEntry>) + Send + Sync>;

/// The committed result of the most recent successful parse. Tree and cookie
/// are one value so readers can never observe a tree from one version with a
/// cookie from another.
struct Committed {
    tree: Arc<dyn SyntaxTree>,
    cookie: Cookie,
}

/// Per-file unit of tracked parse/analysis state.
///
/// One entry exists per path for the lifetime of the file in the registry,
/// shared between the parse side (which commits trees) and the analysis side
/// (which reads them). Every parse submission claims a fresh generation; a
/// commit carrying anything older than the latest claimed generation is a
/// no-op, so late results from superseded parses can never clobber newer
/// state.
pub struct AnalysisEntry {
    path: PathBuf,
    committed: Mutex<Option<Committed>>,
    /// Latest parse generation handed out for this entry.
    parse_generation: AtomicU64,
    tree_observers: Mutex<Vec<EntryObserver>>,
    analysis_observers: Mutex<Vec<EntryObserver>>,
}

impl AnalysisEntry {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: Mutex::new(None),
            parse_generation: AtomicU64::new(0),
            tree_observers: Mutex::new(Vec::new()),
            analysis_observers: Mutex::new(Vec::new()),
        }
    }

    /// Stable identity of the tracked file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Claim the next parse generation. Called once per parse submission;
    /// the returned value travels with the parse and is checked again at
    /// commit time.
    pub(crate) fn next_parse_generation(&self) -> u64 {
        self.parse_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn latest_parse_generation(&self) -> u64 {
        self.parse_generation.load(Ordering::SeqCst)
    }

    /// Commit a parse result, unless a newer parse has been requested since
    /// `generation` was claimed. Returns whether the commit took effect.
    ///
    /// Tree and cookie are stored under one lock acquisition; observers run
    /// after the lock is released.
    pub(crate) fn commit_tree(
        self: &Arc<Self>,
        tree: Arc<dyn SyntaxTree>,
        cookie: Cookie,
        generation: u64,
    ) -> bool {
        if generation != self.latest_parse_generation() {
            debug!(
                "discarding stale parse result for {} (generation {} < {})",
                self.path.display(),
                generation,
                self.latest_parse_generation()
            );
            return false;
        }

        {
            let mut committed = self.committed.lock().unwrap();
            *committed = Some(Committed {
                tree,
                cookie,
            });
        }
        trace!("committed tree for {} (generation {generation})", self.path.display());

        for observer in self.tree_observers.lock().unwrap().iter() {
            observer(self);
        }
        true
    }

    /// The most recent committed tree and the cookie that produced it, read
    /// as one atomic pair.
    pub fn tree_and_cookie(&self) -> Option<(Arc<dyn SyntaxTree>, Cookie)> {
        let committed = self.committed.lock().unwrap();
        committed.as_ref().map(|c| (Arc::clone(&c.tree), c.cookie.clone()))
    }

    /// Whether any parse has ever committed for this entry.
    pub fn has_tree(&self) -> bool {
        self.committed.lock().unwrap().is_some()
    }

    /// Observe "new parse tree committed".
    pub fn on_tree_committed(
        &self,
        observer: EntryObserver,
    ) {
        self.tree_observers.lock().unwrap().push(observer);
    }

    /// Observe "new analysis available".
    pub fn on_analysis_ready(
        &self,
        observer: EntryObserver,
    ) {
        self.analysis_observers.lock().unwrap().push(observer);
    }

    /// Raised by the analysis worker after each analysis round.
    pub(crate) fn emit_analysis_ready(self: &Arc<Self>) {
        for observer in self.analysis_observers.lock().unwrap().iter() {
            observer(self);
        }
    }
}

impl std::fmt::Debug for AnalysisEntry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("AnalysisEntry")
            .field("path", &self.path)
            .field("has_tree", &self.has_tree())
            .field("parse_generation", &self.latest_parse_generation())
            .finish()
    }
}

// ── EntryRegistry ───────────────────────────────────────────────────────────

/// Path → entry map shared by every component of the pipeline.
///
/// Constructed once by the analyzer and passed by reference; entries are
/// created lazily as files are first seen and removed only on explicit
/// close. `DashMap` makes `get_or_create` an atomic check-then-insert under
/// concurrent dispatcher threads.
#[derive(Debug, Default)]
pub struct EntryRegistry {
    entries: DashMap<PathBuf, Arc<AnalysisEntry>>,
}

impl EntryRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Return the entry for `path`, creating and registering one if absent.
    pub fn get_or_create(
        &self,
        path: &Path,
    ) -> Arc<AnalysisEntry> {
        self.entries
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(AnalysisEntry::new(path.to_path_buf())))
            .clone()
    }

    pub fn get(
        &self,
        path: &Path,
    ) -> Option<Arc<AnalysisEntry>> {
        self.entries.get(path).map(|r| r.value().clone())
    }

    /// Explicit removal on editor close. There is no implicit collection;
    /// an entry that is never removed lives for the registry's lifetime.
    pub fn remove(
        &self,
        path: &Path,
    ) -> Option<Arc<AnalysisEntry>> {
        self.entries.remove(path).map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All currently tracked paths.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries.iter().map(|r| r.key().clone()).collect()
    }
}

#[cfg(test)]
#[path = "../tests/src/entry_tests.rs"]
mod tests;
