use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::trace;

use crate::buffer::ChangeEvent;
use crate::content::{TextContent, TextSnapshot};
use crate::entry::AnalysisEntry;
use crate::parse::dispatcher::ParseDispatcher;

// ── BufferTracker ───────────────────────────────────────────────────────────

/// Per-buffer coalescing state.
///
/// Change notifications and the debounce timer callback can race from
/// different threads; every transition happens under this one mutex.
struct DebounceState {
    /// A parse for this buffer is in flight.
    parsing: bool,
    /// Changes arrived while `parsing`; reparse with the latest snapshot
    /// once the in-flight round completes.
    requeue: bool,
    /// A substantive text edit is pending (distinguishes "typed text, then
    /// pressed Enter" from holding Enter on an empty line).
    text_change_seen: bool,
    /// The most recent snapshot seen; every parse round uses this, never
    /// the snapshot of the event that scheduled it.
    latest: Option<TextSnapshot>,
    /// Bumped whenever a scheduled timer is superseded; a timer that wakes
    /// with a stale generation does nothing.
    timer_generation: u64,
    timer_scheduled: bool,
}

/// Watches one live buffer's change stream and decides when to reparse:
/// immediately when a line-affecting edit completes pending text edits,
/// after a quiet window otherwise, or queued behind an in-flight parse.
///
/// Never blocks the thread delivering change events; parse work always runs
/// through the dispatcher's background pool.
pub struct BufferTracker {
    entry: Arc<AnalysisEntry>,
    dispatcher: Arc<ParseDispatcher>,
    runtime: Handle,
    quiet_window: Duration,
    state: Mutex<DebounceState>,
    /// Set on editor close; late events and timers become no-ops.
    closed: AtomicBool,
}

impl BufferTracker {
    pub(crate) fn new(
        entry: Arc<AnalysisEntry>,
        dispatcher: Arc<ParseDispatcher>,
        runtime: Handle,
        quiet_window: Duration,
    ) -> Self {
        Self {
            entry,
            dispatcher,
            runtime,
            quiet_window,
            state: Mutex::new(DebounceState {
                parsing: false,
                requeue: false,
                text_change_seen: false,
                latest: None,
                timer_generation: 0,
                timer_scheduled: false,
            }),
            closed: AtomicBool::new(false),
        }
    }

    /// Handle one change notification from the host buffer.
    pub(crate) fn handle_change(
        self: &Arc<Self>,
        event: ChangeEvent,
    ) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }

        let submit_now = {
            let mut state = self.state.lock().unwrap();
            state.latest = Some(event.snapshot);

            if state.parsing {
                // Supersede, don't cancel: the in-flight parse finishes and
                // the completion path resubmits with the latest snapshot.
                state.requeue = true;
                cancel_timer(&mut state);
                trace!("{}: change during parse, requeue requested", self.entry.path().display());
                None
            } else if event.line_changes && (state.text_change_seen || event.text_changes) {
                // A line-affecting edit landed on top of substantive text
                // edits: the user finished a statement. Reparse now.
                state.text_change_seen = false;
                cancel_timer(&mut state);
                state.parsing = true;
                state.latest.clone()
            } else {
                // Pure in-line typing, or repeated bare line inserts
                // (holding Enter): wait for a quiet window.
                if event.text_changes {
                    state.text_change_seen = true;
                }
                cancel_timer(&mut state);
                state.timer_scheduled = true;
                let generation = state.timer_generation;
                self.schedule_timer(generation);
                None
            }
        };

        if let Some(snapshot) = submit_now {
            self.submit(snapshot);
        }
    }

    /// Request a parse right now (initial parse on monitor). Folds into the
    /// requeue path if a parse is already running.
    pub(crate) fn request_immediate(
        self: &Arc<Self>,
        snapshot: TextSnapshot,
    ) {
        let submit_now = {
            let mut state = self.state.lock().unwrap();
            state.latest = Some(snapshot);
            if state.parsing {
                state.requeue = true;
                None
            } else {
                cancel_timer(&mut state);
                state.parsing = true;
                state.latest.clone()
            }
        };

        if let Some(snapshot) = submit_now {
            self.submit(snapshot);
        }
    }

    /// Reparse from the most recent snapshot, if one has been seen. Used
    /// when a background request targets a file that already has a live
    /// buffer: the buffer's snapshot is fresher than anything on disk, and
    /// routing through here keeps one parse in flight per identity.
    pub(crate) fn reparse_latest(self: &Arc<Self>) {
        let submit_now = {
            let mut state = self.state.lock().unwrap();
            if state.parsing {
                state.requeue = true;
                None
            } else if state.latest.is_some() {
                cancel_timer(&mut state);
                state.parsing = true;
                state.latest.clone()
            } else {
                None
            }
        };

        if let Some(snapshot) = submit_now {
            self.submit(snapshot);
        }
    }

    /// Called by the dispatcher when a parse round for this buffer ends,
    /// whatever the outcome. Either resubmits (requeue was requested) or
    /// returns the buffer to idle; without this running on every path a
    /// buffer would permanently refuse reparses after one bad round.
    pub(crate) fn parse_completed(self: &Arc<Self>) {
        let resubmit = {
            let mut state = self.state.lock().unwrap();
            if state.requeue && !self.closed.load(Ordering::SeqCst) {
                // Stay in the parsing state; the new round starts at once
                // with the freshest snapshot.
                state.requeue = false;
                state.latest.clone()
            } else {
                state.requeue = false;
                state.parsing = false;
                None
            }
        };

        if let Some(snapshot) = resubmit {
            trace!("{}: requeued reparse with latest snapshot", self.entry.path().display());
            self.submit(snapshot);
        }
    }

    /// Stop reacting to events. Late change notifications and timer wakes
    /// become no-ops; an in-flight parse is left to finish on its own.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        cancel_timer(&mut state);
        state.requeue = false;
    }

    fn schedule_timer(
        self: &Arc<Self>,
        generation: u64,
    ) {
        let tracker = Arc::clone(self);
        let quiet_window = self.quiet_window;
        self.runtime.spawn(async move {
            tokio::time::sleep(quiet_window).await;
            tracker.timer_fired(generation);
        });
    }

    fn timer_fired(
        self: &Arc<Self>,
        generation: u64,
    ) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }

        let submit_now = {
            let mut state = self.state.lock().unwrap();
            if !state.timer_scheduled || state.timer_generation != generation {
                // Superseded by a newer edit or an immediate parse.
                return;
            }
            state.timer_scheduled = false;
            if state.parsing {
                // Already guarded: the requeue path picks up the pending
                // changes when the in-flight round completes.
                return;
            }
            state.parsing = true;
            state.text_change_seen = false;
            state.latest.clone()
        };

        if let Some(snapshot) = submit_now {
            trace!("{}: quiet window elapsed, reparsing", self.entry.path().display());
            self.submit(snapshot);
        }
    }

    fn submit(
        self: &Arc<Self>,
        snapshot: TextSnapshot,
    ) {
        let content = TextContent::Snapshot {
            path: self.entry.path().to_path_buf(),
            snapshot,
        };
        self.dispatcher.spawn_buffer_parse(Arc::clone(&self.entry), content, Arc::clone(self));
    }
}

fn cancel_timer(state: &mut DebounceState) {
    state.timer_generation += 1;
    state.timer_scheduled = false;
}

#[cfg(test)]
#[path = "../../tests/src/parse/buffer_tracker_tests.rs"]
mod tests;
