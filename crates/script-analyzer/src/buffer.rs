use std::path::Path;

use crate::content::TextSnapshot;

// ── Buffer boundary ─────────────────────────────────────────────────────────

/// One change notification from the host buffer.
///
/// The host decides the classification: `line_changes` is true when the edit
/// set altered the line count; `text_changes` is true when it contained
/// non-trivial text beyond a bare newline insertion. Both can be true for a
/// single composite edit.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// The snapshot the buffer ended up at after this change.
    pub snapshot: TextSnapshot,
    pub line_changes: bool,
    pub text_changes: bool,
}

/// Callback registered on a buffer's change stream. Invoked on whatever
/// thread the host delivers changes on.
pub type ChangeListener = Box<dyn Fn(ChangeEvent) + Send + Sync>;

/// A live editor buffer the pipeline can monitor.
///
/// Supplied by the host; the pipeline only ever reads snapshots and
/// subscribes to changes.
pub trait TextBuffer: Send + Sync {
    /// Stable file identity of this buffer.
    fn path(&self) -> &Path;

    /// The buffer's current content.
    fn current_snapshot(&self) -> TextSnapshot;

    /// Register a change listener for the lifetime of the buffer.
    fn on_changed(
        &self,
        listener: ChangeListener,
    );
}
