//! Integration tests for a full parallel range pull

use crate::common::{harness, FakeScraper, TEST_ATTEMPTS};
use registry_pull::progress::{ChunkStatus, JobLock, ProgressError};
use registry_pull::pull::{PullError, PullOptions};
use registry_pull::range::Range;
use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tempfile::TempDir;

const START: i64 = 901000001;
const END: i64 = 901000501;

#[tokio::test]
async fn test_pull_covers_every_identifier_once() {
    let temp_dir = TempDir::new().unwrap();
    let h = harness(temp_dir.path(), FakeScraper::new());

    let summary = h
        .orchestrator
        .run(Range::new(START, END), &PullOptions::new(100, 4))
        .await
        .unwrap();

    assert_eq!(summary.total_chunks, 5);
    assert_eq!(summary.completed, 5);
    assert!(summary.is_complete());
    assert!(summary.failed_ids.is_empty());

    let fetched = h.scraper.fetched();
    assert_eq!(fetched.len(), 500);
    let unique: BTreeSet<_> = fetched.iter().copied().collect();
    assert_eq!(unique, (START..END).collect::<BTreeSet<_>>());
    assert_eq!(h.stores.row_count(), 500);

    // One database handle per chunk worker
    assert_eq!(h.stores.opened.load(Ordering::SeqCst), 5);
    // One shared session
    assert_eq!(h.auth.calls.load(Ordering::SeqCst), 1);

    let records = h.progress.list_all().unwrap();
    assert_eq!(records.len(), 5);
    for record in &records {
        assert_eq!(record.status(), ChunkStatus::Completed);
        assert_eq!(record.current(), record.end());
    }
    assert_eq!((records[0].start(), records[0].end()), (901000001, 901000101));
    assert_eq!((records[4].start(), records[4].end()), (901000401, 901000501));
}

#[tokio::test]
async fn test_descending_range_excludes_end() {
    let temp_dir = TempDir::new().unwrap();
    let h = harness(temp_dir.path(), FakeScraper::new());

    let summary = h
        .orchestrator
        .run(Range::new(901000010, 901000000), &PullOptions::new(4, 2))
        .await
        .unwrap();

    assert_eq!(summary.total_chunks, 3);
    assert!(summary.is_complete());
    let fetched: BTreeSet<_> = h.scraper.fetched().into_iter().collect();
    assert_eq!(fetched, (901000001..=901000010).collect::<BTreeSet<_>>());
    assert!(!h.stores.contains(901000000));
}

#[tokio::test]
async fn test_worker_pool_is_bounded() {
    let temp_dir = TempDir::new().unwrap();
    let h = harness(
        temp_dir.path(),
        FakeScraper::new().with_delay(Duration::from_millis(2)),
    );

    h.orchestrator
        .run(Range::new(1, 41), &PullOptions::new(5, 2))
        .await
        .unwrap();

    assert_eq!(h.scraper.fetched().len(), 40);
    assert!(h.scraper.max_in_flight() <= 2);
}

#[tokio::test]
async fn test_unreachable_identifier_is_recorded_once() {
    let temp_dir = TempDir::new().unwrap();
    let bad = 901000042;
    let h = harness(temp_dir.path(), FakeScraper::new().broken(bad));

    let summary = h
        .orchestrator
        .run(Range::new(START, END), &PullOptions::new(100, 4))
        .await
        .unwrap();

    assert_eq!(summary.completed, 4);
    assert_eq!(summary.failed, 1);
    assert!(summary.is_complete());
    assert_eq!(summary.failed_ids, BTreeSet::from([bad]));
    assert_eq!(h.scraper.fetches_of(bad), TEST_ATTEMPTS as usize);

    let record = h.progress.load(0).unwrap().unwrap();
    assert_eq!(record.status(), ChunkStatus::Failed);
    assert_eq!(record.failed().iter().filter(|&&id| id == bad).count(), 1);
    assert_eq!(record.current(), record.end());
    // The rest of the chunk was still pulled
    assert!(h.stores.contains(bad + 1));
    assert!(!h.stores.contains(bad));
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let temp_dir = TempDir::new().unwrap();
    let flaky = 901000003;
    let h = harness(temp_dir.path(), FakeScraper::new().flaky(flaky, 2));

    let summary = h
        .orchestrator
        .run(Range::new(901000001, 901000011), &PullOptions::new(5, 2))
        .await
        .unwrap();

    assert_eq!(summary.completed, 2);
    assert!(summary.failed_ids.is_empty());
    assert_eq!(h.scraper.fetches_of(flaky), 3);
    assert!(h.stores.contains(flaky));
}

#[tokio::test]
async fn test_missing_student_is_not_retried() {
    let temp_dir = TempDir::new().unwrap();
    let missing = 901000004;
    let h = harness(temp_dir.path(), FakeScraper::new().missing(missing));

    let summary = h
        .orchestrator
        .run(Range::new(901000001, 901000011), &PullOptions::new(10, 1))
        .await
        .unwrap();

    assert_eq!(h.scraper.fetches_of(missing), 1);
    assert_eq!(summary.failed_ids, BTreeSet::from([missing]));
}

#[tokio::test]
async fn test_rejected_session_stops_the_run() {
    let temp_dir = TempDir::new().unwrap();
    let h = harness(temp_dir.path(), FakeScraper::new().rejecting_sessions());

    let result = h
        .orchestrator
        .run(Range::new(START, END), &PullOptions::new(100, 2))
        .await;

    assert!(matches!(result, Err(PullError::Session(_))));
    assert!(h.orchestrator.shutdown().is_shutdown_requested());
    assert_eq!(h.stores.row_count(), 0);
    // Chunks still queued behind the two workers never opened a database handle
    assert!(h.stores.opened.load(Ordering::SeqCst) <= 2);

    // Nothing was marked as processed, so a later run starts from the beginning
    for record in h.progress.list_all().unwrap() {
        assert_eq!(record.status(), ChunkStatus::Running);
        assert_eq!(record.current(), record.start());
        assert!(record.failed().is_empty());
    }
}

#[tokio::test]
async fn test_shutdown_before_run_cancels_every_chunk() {
    let temp_dir = TempDir::new().unwrap();
    let h = harness(temp_dir.path(), FakeScraper::new());
    h.orchestrator.shutdown().request_shutdown();

    let summary = h
        .orchestrator
        .run(Range::new(START, END), &PullOptions::new(100, 4))
        .await
        .unwrap();

    assert_eq!(summary.cancelled, 5);
    assert!(!summary.is_complete());
    assert!(h.scraper.fetched().is_empty());
    assert_eq!(h.stores.opened.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_expired_session_is_restored_once() {
    let temp_dir = TempDir::new().unwrap();
    let h = harness(temp_dir.path(), FakeScraper::new().rejecting_first_session());

    let summary = h
        .orchestrator
        .run(Range::new(1, 101), &PullOptions::new(10, 8))
        .await
        .unwrap();

    assert_eq!(summary.completed, 10);
    assert!(summary.is_complete());
    assert!(summary.failed_ids.is_empty());
    assert_eq!(h.stores.row_count(), 100);
    // Every worker saw the rejection, one of them logged in again
    assert_eq!(h.auth.calls.load(Ordering::SeqCst), 2);
    assert!(!h.orchestrator.shutdown().is_shutdown_requested());
}

#[tokio::test]
async fn test_broken_chunk_does_not_stop_the_others() {
    let temp_dir = TempDir::new().unwrap();
    let h = harness(temp_dir.path(), FakeScraper::new());
    // A directory where chunk 2's progress file belongs cannot be written
    std::fs::create_dir_all(h.progress.path_for(2)).unwrap();

    let summary = h
        .orchestrator
        .run(Range::new(1, 51), &PullOptions::new(10, 3))
        .await
        .unwrap();

    assert_eq!(summary.completed, 4);
    assert_eq!(summary.aborted.len(), 1);
    assert_eq!(summary.aborted[0].0, 2);
    assert!(!summary.is_complete());
    assert_eq!(h.stores.row_count(), 40);
    assert!((21..31).all(|id| !h.stores.contains(id)));
    assert!(!h.orchestrator.shutdown().is_shutdown_requested());
}

#[tokio::test]
async fn test_second_pull_on_same_directory_is_refused() {
    let temp_dir = TempDir::new().unwrap();
    let h = harness(temp_dir.path(), FakeScraper::new());

    let mut held = JobLock::open(temp_dir.path()).unwrap();
    let _guard = held.try_acquire().unwrap();

    let result = h
        .orchestrator
        .run(Range::new(START, END), &PullOptions::new(100, 4))
        .await;

    assert!(matches!(
        result,
        Err(PullError::Persistence(ProgressError::Lock(_)))
    ));
    assert!(h.scraper.fetched().is_empty());
}

#[tokio::test]
async fn test_invalid_options_are_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let h = harness(temp_dir.path(), FakeScraper::new());

    let result = h
        .orchestrator
        .run(Range::new(START, END), &PullOptions::new(0, 4))
        .await;
    assert!(matches!(result, Err(PullError::InvalidArgument(_))));

    let result = h
        .orchestrator
        .run(Range::new(START, START), &PullOptions::new(100, 4))
        .await;
    assert!(matches!(result, Err(PullError::Range(_))));
}
