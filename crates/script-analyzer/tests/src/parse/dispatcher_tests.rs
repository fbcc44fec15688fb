use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use super::*;
use crate::config::RetrySettings;
use crate::content::TextSnapshot;
use crate::entry::AnalysisEntry;
use crate::parse::buffer_tracker::BufferTracker;

#[path = "harness.rs"]
mod harness;
use harness::{pipeline, pipeline_with_retry, Pipeline, ScriptedTree};

fn buffer_setup(pipe: &Pipeline) -> (Arc<AnalysisEntry>, Arc<BufferTracker>) {
    let entry = Arc::new(AnalysisEntry::new(PathBuf::from("/proj/main.scr")));
    let tracker = Arc::new(BufferTracker::new(
        Arc::clone(&entry),
        Arc::clone(&pipe.dispatcher),
        Handle::current(),
        Duration::from_millis(100),
    ));
    (entry, tracker)
}

fn committed_text(entry: &Arc<AnalysisEntry>) -> Option<String> {
    entry.tree_and_cookie().map(|(tree, _)| {
        tree.as_any().downcast_ref::<ScriptedTree>().map(|t| t.text.clone()).unwrap_or_default()
    })
}

async fn wait_until(condition: impl Fn() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread")]
async fn clean_buffer_parse_commits_and_analyzes() {
    let pipe = pipeline();
    let (entry, tracker) = buffer_setup(&pipe);

    tracker.request_immediate(TextSnapshot::new("x = 1", 4));

    assert!(wait_until(|| entry.has_tree()).await);
    let (_, cookie) = entry.tree_and_cookie().unwrap();
    assert_eq!(cookie.snapshot_version(), Some(4));

    // Analysis followed the commit.
    assert!(wait_until(|| pipe.handler.analyses.load(Ordering::SeqCst) == 1).await);
    // Even a clean parse publishes (an empty set clears stale squiggles).
    assert!(wait_until(|| pipe.sink.publish_count() == 1).await);
    assert!(pipe.sink.published.lock().unwrap()[0].1.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn buffer_parse_with_errors_keeps_previous_tree() {
    let pipe = pipeline();
    let (entry, tracker) = buffer_setup(&pipe);

    tracker.request_immediate(TextSnapshot::new("x = 1", 1));
    assert!(wait_until(|| entry.has_tree()).await);

    // A broken intermediate edit: diagnostics flow, the tree does not.
    tracker.request_immediate(TextSnapshot::new("x = syntax error", 2));
    assert!(pipe.parser.wait_for_calls(2).await);
    assert!(wait_until(|| pipe.sink.publish_count() == 2).await);

    assert_eq!(committed_text(&entry).as_deref(), Some("x = 1"));
    let (_, cookie) = entry.tree_and_cookie().unwrap();
    assert_eq!(cookie.snapshot_version(), Some(1));

    let published = pipe.sink.published.lock().unwrap();
    assert_eq!(published[1].1.len(), 1);
    assert_eq!(published[1].1[0].message, "scripted syntax error");

    // Only the clean parse reached analysis.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(pipe.handler.analyses.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn file_parse_commits_despite_errors() {
    let pipe = pipeline();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.scr");
    std::fs::write(&path, "x = syntax error").unwrap();

    let entry = Arc::new(AnalysisEntry::new(path.clone()));
    pipe.dispatcher.spawn_file_parse(Arc::clone(&entry), path);

    // No editor to protect: background files keep whatever parsed.
    assert!(wait_until(|| entry.has_tree()).await);
    assert_eq!(committed_text(&entry).as_deref(), Some("x = syntax error"));
    assert!(wait_until(|| pipe.handler.analyses.load(Ordering::SeqCst) == 1).await);

    // Background files don't publish editor squiggles.
    assert_eq!(pipe.sink.publish_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_file_gives_up_after_bounded_retries() {
    let retry = RetrySettings {
        io_attempts: 2,
        io_delay_ms: 10,
    };
    let pipe = pipeline_with_retry(retry);

    let path = PathBuf::from("/definitely/not/here.scr");
    let entry = Arc::new(AnalysisEntry::new(path.clone()));
    pipe.dispatcher.spawn_file_parse(Arc::clone(&entry), path);

    assert!(wait_until(|| !pipe.dispatcher.is_parsing()).await);
    assert_eq!(pipe.parser.call_count(), 0);
    assert!(!entry.has_tree());
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_file_requests_coalesce_into_a_rerun() {
    let pipe = pipeline();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lib.scr");
    std::fs::write(&path, "y = 2").unwrap();

    *pipe.parser.delay_first.lock().unwrap() = Some(Duration::from_millis(200));

    let entry = Arc::new(AnalysisEntry::new(path.clone()));
    pipe.dispatcher.spawn_file_parse(Arc::clone(&entry), path.clone());
    assert!(pipe.parser.wait_for_calls(1).await);

    // Three more requests while the first is still running: one rerun.
    pipe.dispatcher.spawn_file_parse(Arc::clone(&entry), path.clone());
    pipe.dispatcher.spawn_file_parse(Arc::clone(&entry), path.clone());
    pipe.dispatcher.spawn_file_parse(Arc::clone(&entry), path);

    assert!(pipe.parser.wait_for_calls(2).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(pipe.parser.call_count(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn stale_parse_result_is_discarded_at_commit() {
    let pipe = pipeline();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("main.scr");
    std::fs::write(&path, "x = disk").unwrap();

    // A slow background parse of the on-disk content...
    *pipe.parser.delay_first.lock().unwrap() = Some(Duration::from_millis(300));
    let entry = Arc::new(AnalysisEntry::new(path.clone()));
    pipe.dispatcher.spawn_file_parse(Arc::clone(&entry), path);
    assert!(pipe.parser.wait_for_calls(1).await);

    // ...is superseded by a live-buffer parse requested after it.
    let tracker = Arc::new(BufferTracker::new(
        Arc::clone(&entry),
        Arc::clone(&pipe.dispatcher),
        Handle::current(),
        Duration::from_millis(100),
    ));
    tracker.request_immediate(TextSnapshot::new("x = live", 5));
    assert!(pipe.parser.wait_for_calls(2).await);
    assert!(wait_until(|| committed_text(&entry).as_deref() == Some("x = live")).await);

    // The stale file parse finishes late; its commit must be a no-op.
    assert!(wait_until(|| !pipe.dispatcher.is_parsing()).await);
    assert_eq!(committed_text(&entry).as_deref(), Some("x = live"));
    let (_, cookie) = entry.tree_and_cookie().unwrap();
    assert_eq!(cookie.snapshot_version(), Some(5));
}
