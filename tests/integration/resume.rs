//! Integration tests for resuming, skipping and resetting chunks

use crate::common::{harness, FakeScraper};
use registry_pull::progress::{ChunkStatus, ProgressRecord};
use registry_pull::pull::PullOptions;
use registry_pull::range::{Chunk, Range};
use std::collections::BTreeSet;
use tempfile::TempDir;

const START: i64 = 901000001;
const END: i64 = 901000501;

/// Persist chunk 0 as if a previous run stopped after 49 identifiers
fn interrupted_first_chunk(h: &crate::common::Harness) {
    let chunk = Chunk::new(0, 901000001, 901000101);
    let mut record = ProgressRecord::new(&chunk);
    record.mark_running().unwrap();
    for id in chunk.ids().take(49) {
        record.record_success(id).unwrap();
    }
    assert_eq!(record.current(), 901000050);
    h.progress.save(&record).unwrap();
}

#[tokio::test]
async fn test_resume_continues_from_persisted_cursor() {
    let temp_dir = TempDir::new().unwrap();
    let h = harness(temp_dir.path(), FakeScraper::new());
    interrupted_first_chunk(&h);

    let summary = h
        .orchestrator
        .run(Range::new(START, END), &PullOptions::new(100, 4))
        .await
        .unwrap();
    assert!(summary.is_complete());
    assert_eq!(summary.skipped, 0);

    let fetched = h.scraper.fetched();
    let first_chunk: BTreeSet<_> = fetched
        .iter()
        .copied()
        .filter(|&id| id < 901000101)
        .collect();
    assert_eq!(first_chunk, (901000050..901000101).collect::<BTreeSet<_>>());
    assert_eq!(fetched.len(), 51 + 400);

    // No identifier was fetched twice
    let unique: BTreeSet<_> = fetched.iter().copied().collect();
    assert_eq!(unique.len(), fetched.len());

    let record = h.progress.load(0).unwrap().unwrap();
    assert_eq!(record.status(), ChunkStatus::Completed);
    assert_eq!(record.processed(), 100);
}

#[tokio::test]
async fn test_finished_chunks_are_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let first = harness(temp_dir.path(), FakeScraper::new());
    first
        .orchestrator
        .run(Range::new(START, END), &PullOptions::new(100, 4))
        .await
        .unwrap();

    let second = harness(temp_dir.path(), FakeScraper::new());
    let summary = second
        .orchestrator
        .run(Range::new(START, END), &PullOptions::new(100, 4))
        .await
        .unwrap();

    assert_eq!(summary.skipped, 5);
    assert_eq!(summary.completed, 5);
    assert!(second.scraper.fetched().is_empty());
}

#[tokio::test]
async fn test_failed_chunks_stay_terminal_across_runs() {
    let temp_dir = TempDir::new().unwrap();
    let bad = 901000150;
    let first = harness(temp_dir.path(), FakeScraper::new().broken(bad));
    first
        .orchestrator
        .run(Range::new(START, END), &PullOptions::new(100, 4))
        .await
        .unwrap();

    let second = harness(temp_dir.path(), FakeScraper::new());
    let summary = second
        .orchestrator
        .run(Range::new(START, END), &PullOptions::new(100, 4))
        .await
        .unwrap();

    assert_eq!(summary.skipped, 5);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failed_ids, BTreeSet::from([bad]));
    assert_eq!(second.scraper.fetches_of(bad), 0);
}

#[tokio::test]
async fn test_reset_pulls_everything_again() {
    let temp_dir = TempDir::new().unwrap();
    let bad = 901000150;
    let first = harness(temp_dir.path(), FakeScraper::new().broken(bad));
    first
        .orchestrator
        .run(Range::new(START, END), &PullOptions::new(100, 4))
        .await
        .unwrap();

    let second = harness(temp_dir.path(), FakeScraper::new());
    let summary = second
        .orchestrator
        .run(
            Range::new(START, END),
            &PullOptions::new(100, 4).with_reset(true),
        )
        .await
        .unwrap();

    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.completed, 5);
    assert!(summary.failed_ids.is_empty());
    assert_eq!(second.scraper.fetched().len(), 500);
    assert!(second.stores.contains(bad));
}

#[tokio::test]
async fn test_record_of_a_different_range_is_replaced() {
    let temp_dir = TempDir::new().unwrap();
    let h = harness(temp_dir.path(), FakeScraper::new());

    // Chunk 0 of an earlier, differently sized run
    let stale_chunk = Chunk::new(0, 1, 11);
    let mut stale = ProgressRecord::new(&stale_chunk);
    stale.mark_running().unwrap();
    stale.record_success(1).unwrap();
    h.progress.save(&stale).unwrap();

    h.orchestrator
        .run(Range::new(START, END), &PullOptions::new(100, 4))
        .await
        .unwrap();

    let record = h.progress.load(0).unwrap().unwrap();
    assert_eq!((record.start(), record.end()), (901000001, 901000101));
    assert_eq!(record.status(), ChunkStatus::Completed);
    assert_eq!(h.scraper.fetched().len(), 500);
}

#[tokio::test]
async fn test_corrupt_record_restarts_chunk() {
    let temp_dir = TempDir::new().unwrap();
    let h = harness(temp_dir.path(), FakeScraper::new());
    std::fs::write(h.progress.path_for(2), b"{ not json").unwrap();

    let summary = h
        .orchestrator
        .run(Range::new(START, END), &PullOptions::new(100, 4))
        .await
        .unwrap();

    assert!(summary.is_complete());
    assert_eq!(h.scraper.fetched().len(), 500);
    let record = h.progress.load(2).unwrap().unwrap();
    assert_eq!(record.status(), ChunkStatus::Completed);
}

#[tokio::test]
async fn test_shutdown_mid_chunk_loses_no_progress() {
    let temp_dir = TempDir::new().unwrap();
    let first = harness(temp_dir.path(), FakeScraper::new());
    first
        .scraper
        .shutdown_after(30, first.orchestrator.shutdown().clone());

    let summary = first
        .orchestrator
        .run(Range::new(1, 101), &PullOptions::new(50, 1))
        .await
        .unwrap();
    assert_eq!(summary.cancelled, 2);
    assert_eq!(first.scraper.fetched(), (1..=30).collect::<Vec<_>>());

    // The identifier in flight when shutdown arrived was still committed
    let record = first.progress.load(0).unwrap().unwrap();
    assert_eq!(record.status(), ChunkStatus::Running);
    assert_eq!(record.current(), 31);
    assert!(record.failed().is_empty());
    assert_eq!(first.stores.row_count(), 30);
    assert_eq!(first.progress.load(1).unwrap(), None);

    let second = harness(temp_dir.path(), FakeScraper::new());
    let summary = second
        .orchestrator
        .run(Range::new(1, 101), &PullOptions::new(50, 1))
        .await
        .unwrap();

    assert!(summary.is_complete());
    let mut fetched = second.scraper.fetched();
    fetched.sort_unstable();
    assert_eq!(fetched, (31..101).collect::<Vec<_>>());
}
