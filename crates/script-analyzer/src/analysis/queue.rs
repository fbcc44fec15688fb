use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::entry::AnalysisEntry;

// ── Priority ────────────────────────────────────────────────────────────────

/// Priority of a queued analysis. Live-buffer reparses enqueue at `High` so
/// the file being edited reanalyzes ahead of any backlog of background
/// files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AnalysisPriority {
    Normal = 0,
    High = 1,
}

const PRIORITY_LEVELS: usize = 2;

impl AnalysisPriority {
    fn from_level(level: usize) -> Self {
        match level {
            0 => AnalysisPriority::Normal,
            _ => AnalysisPriority::High,
        }
    }
}

// ── AnalysisQueue ───────────────────────────────────────────────────────────

/// Consumes entries popped by the queue worker. This is where semantic
/// analysis runs; the queue guarantees at most one invocation is executing
/// at any instant, so implementations may mutate shared semantic state
/// (module caches, type tables) without their own synchronization.
pub trait AnalysisHandler: Send + Sync + 'static {
    fn analyze(
        &self,
        entry: &Arc<AnalysisEntry>,
    );
}

struct QueueState {
    /// One bucket per priority, drained highest-first. Within the High
    /// bucket fresh entries go to the FRONT (the actively edited file should
    /// preempt an earlier backlog as soon as possible); Normal entries
    /// append in FIFO order.
    buckets: [VecDeque<Arc<AnalysisEntry>>; PRIORITY_LEVELS],
    unloading: bool,
}

impl QueueState {
    fn pending(&self) -> usize {
        self.buckets.iter().map(VecDeque::len).sum()
    }

    fn pop_highest(&mut self) -> Option<Arc<AnalysisEntry>> {
        for bucket in self.buckets.iter_mut().rev() {
            if let Some(entry) = bucket.pop_front() {
                return Some(entry);
            }
        }
        None
    }
}

struct QueueShared {
    state: Mutex<QueueState>,
    wakeup: Condvar,
    analyzing: AtomicBool,
}

/// Priority-bucketed work list drained by one dedicated worker thread.
///
/// Enqueueing dedupes by entry identity: a second enqueue for the same path
/// replaces the first at `max(old, new)` priority instead of appending a
/// duplicate, so a burst of edits to one file collapses into a single
/// pending analysis. The worker blocks on a condvar while the buckets are
/// empty and runs the handler outside the queue lock, so enqueues from
/// other threads never wait on an analysis in progress.
pub struct AnalysisQueue {
    shared: Arc<QueueShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AnalysisQueue {
    /// Start the queue and its worker thread.
    pub fn new(handler: Arc<dyn AnalysisHandler>) -> Self {
        let shared = Arc::new(QueueShared {
            state: Mutex::new(QueueState {
                buckets: [VecDeque::new(), VecDeque::new()],
                unloading: false,
            }),
            wakeup: Condvar::new(),
            analyzing: AtomicBool::new(false),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("analysis-queue".to_string())
            .spawn(move || worker_loop(worker_shared, handler))
            .expect("failed to spawn analysis worker thread");

        Self {
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Schedule `entry` for analysis at `priority`.
    ///
    /// If the entry is already queued it is moved rather than duplicated,
    /// and its priority is promoted to the higher of the two requests.
    pub fn enqueue(
        &self,
        entry: Arc<AnalysisEntry>,
        priority: AnalysisPriority,
    ) {
        let mut state = self.shared.state.lock().unwrap();
        if state.unloading {
            debug!("queue stopping; dropping analysis request for {}", entry.path().display());
            return;
        }

        let mut effective = priority;
        for (level, bucket) in state.buckets.iter_mut().enumerate() {
            if let Some(pos) = bucket.iter().position(|queued| queued.path() == entry.path()) {
                bucket.remove(pos);
                effective = effective.max(AnalysisPriority::from_level(level));
            }
        }

        match effective {
            AnalysisPriority::High => {
                state.buckets[AnalysisPriority::High as usize].push_front(entry);
            },
            AnalysisPriority::Normal => {
                state.buckets[AnalysisPriority::Normal as usize].push_back(entry);
            },
        }

        drop(state);
        self.shared.wakeup.notify_one();
    }

    /// Whether an analysis is executing or any entry is still queued.
    pub fn is_analyzing(&self) -> bool {
        self.shared.analyzing.load(Ordering::SeqCst) || self.shared.state.lock().unwrap().pending() > 0
    }

    /// Number of queued (not yet started) entries.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().unwrap().pending()
    }

    /// Stop the worker. Queued entries are abandoned; an analysis already in
    /// progress runs to completion. Idempotent.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.unloading {
                return;
            }
            state.unloading = true;
        }
        self.shared.wakeup.notify_all();

        if let Some(worker) = self.worker.lock().unwrap().take()
            && worker.join().is_err()
        {
            warn!("analysis worker terminated abnormally");
        }
    }
}

impl Drop for AnalysisQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(
    shared: Arc<QueueShared>,
    handler: Arc<dyn AnalysisHandler>,
) {
    info!("analysis worker started");

    loop {
        let entry = {
            let mut state = shared.state.lock().unwrap();
            loop {
                if state.unloading {
                    info!("analysis worker stopped");
                    return;
                }
                if let Some(entry) = state.pop_highest() {
                    // Flag flips under the lock so `is_analyzing` can never
                    // observe the instant between pop and start.
                    shared.analyzing.store(true, Ordering::SeqCst);
                    break entry;
                }
                state = shared.wakeup.wait(state).unwrap();
            }
        };

        // The handler runs outside the lock: analyses can take arbitrarily
        // long and must never block enqueues from other threads.
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            handler.analyze(&entry);
            entry.emit_analysis_ready();
        }));
        shared.analyzing.store(false, Ordering::SeqCst);

        if outcome.is_err() {
            warn!("analysis of {} panicked; worker continuing with next item", entry.path().display());
        }
    }
}

#[cfg(test)]
#[path = "../../tests/src/analysis/queue_tests.rs"]
mod tests;
