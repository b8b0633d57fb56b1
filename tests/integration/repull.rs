//! Integration tests for re-pulling failed identifiers

use crate::common::{harness, FakeScraper, TEST_ATTEMPTS};
use registry_pull::progress::ChunkStatus;
use registry_pull::pull::PullOptions;
use registry_pull::range::Range;
use std::collections::BTreeSet;
use tempfile::TempDir;

#[tokio::test]
async fn test_repull_recovers_healed_identifiers() {
    let temp_dir = TempDir::new().unwrap();
    let (healed, still_broken) = (901000007, 901000013);
    let h = harness(
        temp_dir.path(),
        FakeScraper::new().broken(healed).broken(still_broken),
    );

    h.orchestrator
        .run(Range::new(901000001, 901000021), &PullOptions::new(10, 2))
        .await
        .unwrap();

    let failed = h.orchestrator.failed_identifiers().unwrap();
    assert_eq!(failed, BTreeSet::from([healed, still_broken]));

    h.scraper.heal(healed);
    let ids: Vec<_> = failed.into_iter().collect();
    let report = h.orchestrator.repull(&ids).await.unwrap();

    assert_eq!(report.recovered, vec![healed]);
    assert_eq!(report.still_failed, vec![still_broken]);
    assert!(!report.cancelled);
    assert!(h.stores.contains(healed));
    assert_eq!(h.scraper.fetches_of(still_broken), 2 * TEST_ATTEMPTS as usize);

    // Progress records are left as the pull wrote them
    for record in h.progress.list_all().unwrap() {
        assert_eq!(record.status(), ChunkStatus::Failed);
        assert_eq!(record.failed().len(), 1);
    }
}

#[tokio::test]
async fn test_repull_without_failures_does_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let h = harness(temp_dir.path(), FakeScraper::new());

    let report = h.orchestrator.repull(&[]).await.unwrap();
    assert!(report.recovered.is_empty());
    assert!(report.still_failed.is_empty());
    assert!(h.scraper.fetched().is_empty());
}

#[tokio::test]
async fn test_repull_stops_on_shutdown() {
    let temp_dir = TempDir::new().unwrap();
    let h = harness(temp_dir.path(), FakeScraper::new());
    h.orchestrator.shutdown().request_shutdown();

    let report = h.orchestrator.repull(&[1, 2, 3]).await.unwrap();
    assert!(report.cancelled);
    assert!(report.recovered.is_empty());
    assert!(h.scraper.fetched().is_empty());
}
