//! Integration tests for the read-only progress monitor

use crate::common::{harness, FakeScraper};
use futures::StreamExt;
use registry_pull::monitor::ProgressMonitor;
use registry_pull::progress::{ChunkStatus, ProgressRecord, ProgressStore};
use registry_pull::pull::PullOptions;
use registry_pull::range::{Chunk, Range};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn file_times(dir: &std::path::Path) -> BTreeMap<PathBuf, (SystemTime, Vec<u8>)> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| {
            let path = entry.unwrap().path();
            let modified = std::fs::metadata(&path).unwrap().modified().unwrap();
            let contents = std::fs::read(&path).unwrap();
            (path, (modified, contents))
        })
        .collect()
}

#[tokio::test]
async fn test_monitor_after_complete_run_leaves_files_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let h = harness(temp_dir.path(), FakeScraper::new());
    h.orchestrator
        .run(Range::new(901000001, 901000501), &PullOptions::new(100, 4))
        .await
        .unwrap();

    let before = file_times(temp_dir.path());

    let monitor = ProgressMonitor::new(ProgressStore::new(temp_dir.path()));
    let snapshots: Vec<_> = monitor
        .poll(Duration::from_millis(5))
        .take(3)
        .collect()
        .await;

    assert_eq!(snapshots.len(), 3);
    for snapshot in snapshots {
        let snapshot = snapshot.unwrap();
        assert_eq!(snapshot.chunks.len(), 5);
        assert_eq!(snapshot.remaining(), 0);
        assert_eq!(snapshot.processed(), 500);
        assert!(snapshot.all_terminal());
        assert_eq!(snapshot.percentage(), 100.0);
    }

    assert_eq!(file_times(temp_dir.path()), before);
}

#[tokio::test]
async fn test_snapshot_reflects_partial_progress() {
    let temp_dir = TempDir::new().unwrap();
    let store = ProgressStore::new(temp_dir.path());

    let chunk = Chunk::new(0, 901000001, 901000101);
    let mut running = ProgressRecord::new(&chunk);
    running.mark_running().unwrap();
    for id in chunk.ids().take(25) {
        running.record_success(id).unwrap();
    }
    store.save(&running).unwrap();
    store
        .save(&ProgressRecord::new(&Chunk::new(1, 901000101, 901000201)))
        .unwrap();

    let snapshot = ProgressMonitor::new(store).snapshot().unwrap();
    assert_eq!(snapshot.total(), 200);
    assert_eq!(snapshot.processed(), 25);
    assert_eq!(snapshot.remaining(), 175);
    assert_eq!(snapshot.count(ChunkStatus::Running), 1);
    assert_eq!(snapshot.count(ChunkStatus::Pending), 1);
    assert!(!snapshot.all_terminal());

    let rendered = snapshot.render();
    assert!(rendered.contains("PARALLEL STUDENTS RANGE PULL"));
    assert!(rendered.contains("25/200"));
}

#[tokio::test]
async fn test_monitor_on_missing_directory() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("never-created");
    let monitor = ProgressMonitor::new(ProgressStore::new(&missing));

    let snapshot = monitor.snapshot().unwrap();
    assert!(snapshot.chunks.is_empty());
    assert!(!missing.exists());
}

#[tokio::test]
async fn test_poll_streams_are_independent() {
    let temp_dir = TempDir::new().unwrap();
    let store = ProgressStore::new(temp_dir.path());
    let monitor = ProgressMonitor::new(store.clone());

    let mut first = Box::pin(monitor.poll(Duration::from_millis(5)));
    assert!(first.next().await.unwrap().unwrap().chunks.is_empty());

    store
        .save(&ProgressRecord::new(&Chunk::new(0, 1, 11)))
        .unwrap();

    let mut second = Box::pin(monitor.poll(Duration::from_millis(5)));
    assert_eq!(second.next().await.unwrap().unwrap().chunks.len(), 1);
    assert_eq!(first.next().await.unwrap().unwrap().chunks.len(), 1);
}
