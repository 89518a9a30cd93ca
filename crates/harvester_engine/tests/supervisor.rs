mod common;

use std::sync::Arc;

use chrono::NaiveDate;
use common::{card, settings, FakeBrowser, FakeListing, RecordingPipeline};
use harvester_core::{ListingProfile, RunOutcome};
use harvester_engine::{compact, CollectionLoop, HarvestError, NoProgress, RestartSupervisor};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn target() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 12, 1).unwrap()
}

fn listing() -> FakeListing {
    FakeListing::new(vec![
        vec![
            card("GEM/2025/B/1", "01-12-2025 11:00 AM"),
            card("GEM/2025/B/2", "01-12-2025 10:00 AM"),
        ],
        vec![
            card("GEM/2025/B/3", "01-12-2025 09:00 AM"),
            card("GEM/2025/B/4", "30-11-2025 09:00 AM"),
        ],
    ])
}

#[tokio::test]
async fn restarts_after_a_crash_and_compaction_dedupes_the_replay() {
    engine_logging::initialize_for_tests();
    let temp = TempDir::new().unwrap();
    let browser = FakeBrowser::new(listing().failing_scan(2, 1));
    let collection = CollectionLoop::new(
        settings(temp.path()),
        ListingProfile::default(),
        Arc::new(RecordingPipeline::default()),
    )
    .unwrap();

    let stats = RestartSupervisor::new(&browser, &collection, &NoProgress)
        .run_with_retries(target())
        .await
        .unwrap();

    assert_eq!(stats.outcome, RunOutcome::Done);
    assert_eq!(stats.accepted_count, 3);
    assert_eq!((browser.opens(), browser.closes()), (2, 2));

    let compaction = compact(stats.log_path.as_deref().unwrap()).unwrap();
    assert_eq!(compaction.total_lines, 5);
    assert_eq!(
        compaction.identifiers(),
        vec!["GEM/2025/B/1", "GEM/2025/B/2", "GEM/2025/B/3"]
    );
}

#[tokio::test]
async fn browser_launch_failures_are_retried() {
    let temp = TempDir::new().unwrap();
    let browser = FakeBrowser::new(listing()).failing_opens(1);
    let collection = CollectionLoop::new(
        settings(temp.path()),
        ListingProfile::default(),
        Arc::new(RecordingPipeline::default()),
    )
    .unwrap();

    let stats = RestartSupervisor::new(&browser, &collection, &NoProgress)
        .run_with_retries(target())
        .await
        .unwrap();

    assert_eq!(stats.accepted_count, 3);
    assert_eq!(browser.opens(), 2);
}

#[tokio::test]
async fn exhaustion_reports_last_error_and_partial_stats() {
    let temp = TempDir::new().unwrap();
    let browser = FakeBrowser::new(listing().failing_scan(2, 10));
    let collection = CollectionLoop::new(
        settings(temp.path()),
        ListingProfile::default(),
        Arc::new(RecordingPipeline::default()),
    )
    .unwrap();

    let err = RestartSupervisor::new(&browser, &collection, &NoProgress)
        .run_with_retries(target())
        .await
        .unwrap_err();

    match &err {
        HarvestError::RestartsExhausted {
            attempts,
            last_error,
            stats,
        } => {
            assert_eq!(*attempts, 2);
            assert!(last_error.contains("renderer crashed"), "{last_error}");
            let stats = stats.as_ref().unwrap();
            assert_eq!(stats.outcome, RunOutcome::Incomplete);
            assert_eq!(stats.accepted_count, 2);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.partial_stats().map(|s| s.pages_scanned), Some(2));
    assert_eq!(browser.closes(), 2);
}
