use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use super::*;
use crate::content::TextSnapshot;
use crate::entry::AnalysisEntry;

#[path = "harness.rs"]
mod harness;
use harness::{change, pipeline, Pipeline};

fn tracker_with_window(
    pipeline: &Pipeline,
    quiet_window: Duration,
) -> Arc<BufferTracker> {
    let entry = Arc::new(AnalysisEntry::new(PathBuf::from("/proj/main.scr")));
    Arc::new(BufferTracker::new(
        entry,
        Arc::clone(&pipeline.dispatcher),
        Handle::current(),
        quiet_window,
    ))
}

#[tokio::test(flavor = "multi_thread")]
async fn burst_of_text_edits_collapses_into_one_parse() {
    let pipe = pipeline();
    let tracker = tracker_with_window(&pipe, Duration::from_millis(200));

    // Five keystrokes well inside the quiet window.
    for version in 1..=5u64 {
        tracker.handle_change(change(&format!("x = {version}"), version, false, true));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(pipe.parser.wait_for_calls(1).await);
    tokio::time::sleep(Duration::from_millis(400)).await;

    // Exactly one parse, with the snapshot of the last keystroke.
    assert_eq!(pipe.parser.call_count(), 1);
    let call = pipe.parser.call(0);
    assert_eq!(call.text, "x = 5");
    assert_eq!(call.version, Some(5));
}

#[tokio::test(flavor = "multi_thread")]
async fn line_edit_completing_text_edit_parses_immediately() {
    let pipe = pipeline();
    // A quiet window so long the test would time out if it waited for it.
    let tracker = tracker_with_window(&pipe, Duration::from_secs(60));

    tracker.handle_change(change("x = 1", 1, false, true));
    tracker.handle_change(change("x = 1\n", 2, true, false));

    assert!(pipe.parser.wait_for_calls(1).await);
    let call = pipe.parser.call(0);
    assert_eq!(call.version, Some(2));
}

#[tokio::test(flavor = "multi_thread")]
async fn bare_line_inserts_only_debounce() {
    let pipe = pipeline();
    let tracker = tracker_with_window(&pipe, Duration::from_millis(150));

    // Holding Enter: repeated line changes with no substantive text.
    for version in 1..=3u64 {
        tracker.handle_change(change(&"\n".repeat(version as usize), version, true, false));
    }

    // No immediate parse.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pipe.parser.call_count(), 0);

    // One parse after the window elapses.
    assert!(pipe.parser.wait_for_calls(1).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(pipe.parser.call_count(), 1);
    assert_eq!(pipe.parser.call(0).version, Some(3));
}

#[tokio::test(flavor = "multi_thread")]
async fn changes_during_parse_requeue_with_latest_snapshot() {
    let pipe = pipeline();
    let tracker = tracker_with_window(&pipe, Duration::from_millis(100));

    *pipe.parser.delay_first.lock().unwrap() = Some(Duration::from_millis(250));
    tracker.request_immediate(TextSnapshot::new("x = 1", 1));
    assert!(pipe.parser.wait_for_calls(1).await);

    // Edits arriving while the first parse is still running.
    tracker.handle_change(change("x = 2", 2, false, true));
    tracker.handle_change(change("x = 3", 3, false, true));

    // The in-flight parse completes, then exactly one requeued parse runs
    // with the freshest snapshot (no debounce wait on the requeue path).
    assert!(pipe.parser.wait_for_calls(2).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(pipe.parser.call_count(), 2);
    assert_eq!(pipe.parser.call(1).version, Some(3));
    assert_eq!(pipe.parser.call(1).text, "x = 3");
}

#[tokio::test(flavor = "multi_thread")]
async fn parser_panic_does_not_wedge_the_buffer() {
    let pipe = pipeline();
    let tracker = tracker_with_window(&pipe, Duration::from_millis(100));

    pipe.parser.panic_first.store(true, std::sync::atomic::Ordering::SeqCst);
    tracker.request_immediate(TextSnapshot::new("x = 1", 1));
    assert!(pipe.parser.wait_for_calls(1).await);

    // The parsing flag must have been cleared despite the panic.
    tracker.request_immediate(TextSnapshot::new("x = 2", 2));
    assert!(pipe.parser.wait_for_calls(2).await);
    assert_eq!(pipe.parser.call(1).version, Some(2));
}

#[tokio::test(flavor = "multi_thread")]
async fn closed_tracker_ignores_events_and_timers() {
    let pipe = pipeline();
    let tracker = tracker_with_window(&pipe, Duration::from_millis(50));

    tracker.handle_change(change("x = 1", 1, false, true));
    tracker.close();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(pipe.parser.call_count(), 0);

    tracker.handle_change(change("x = 2", 2, false, true));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(pipe.parser.call_count(), 0);
}
