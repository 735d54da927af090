//! Report rendering and serialization through complete batch runs.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use warden::directory::{DirectoryError, InMemoryDirectory};
use warden::registry::{InMemoryStore, Registry};
use warden::resilience::RetryPolicy;
use warden::types::{ChannelId, GroupName, Participant, SubjectId};
use warden::{BatchReport, BatchRunner, OperationRequest, Subject, TargetScope};

async fn registry_with(groups: &[(&str, &[i64])]) -> Arc<Registry> {
    let registry = Arc::new(
        Registry::open(Arc::new(InMemoryStore::new()), BTreeSet::new())
            .await
            .expect("open registry"),
    );
    for (name, ids) in groups {
        for id in *ids {
            registry
                .add_channel(GroupName::new(*name), ChannelId(*id))
                .await
                .expect("register channel");
        }
    }
    registry
}

fn runner(directory: Arc<InMemoryDirectory>, registry: Arc<Registry>) -> BatchRunner {
    BatchRunner::builder()
        .with_directory(directory)
        .with_registry(registry)
        .with_policy(RetryPolicy::new().with_base_delay(Duration::from_millis(2)))
        .with_throttle_interval(Duration::ZERO)
        .build()
        .expect("build runner")
}

#[tokio::test]
async fn test_summary_shows_groups_rows_and_totals() {
    let directory = Arc::new(InMemoryDirectory::new());
    directory.add_channel(ChannelId(-1), "Main");
    directory.add_channel(ChannelId(-2), "Backup");
    directory.add_channel(ChannelId(-3), "News Desk");
    directory.add_subject(SubjectId(7), "spammer");
    directory.script_apply(ChannelId(-2), vec![Err(DirectoryError::PermissionDenied)]);
    let registry = registry_with(&[("vip", &[-1, -2]), ("news", &[-3])]).await;
    let runner = runner(directory, registry);

    let request = OperationRequest::restrict(
        Subject::new(SubjectId(7)),
        TargetScope::Groups(vec![GroupName::new("vip"), GroupName::new("news")]),
    );
    let report = runner.run(&request).await.expect("batch");
    let summary = report.summary();

    assert!(summary.starts_with("restrict results for @spammer"));
    assert_eq!(summary.matches("[vip]").count(), 1);
    assert_eq!(summary.matches("[news]").count(), 1);
    assert!(summary.contains("ok       Main"));
    assert!(summary.contains("failed   Backup: missing admin rights on the channel"));
    assert!(summary.contains("ok       News Desk"));
    assert!(summary.contains("totals: 2 succeeded, 1 failed, 0 skipped (3 targets"));
}

#[tokio::test]
async fn test_remove_rows_carry_the_member_label() {
    let directory = Arc::new(InMemoryDirectory::new());
    directory.add_channel(ChannelId(-1), "Main");
    directory.add_subject(SubjectId(9), "straggler");
    directory.set_members(ChannelId(-1), vec![Participant::new(SubjectId(9))]);
    let registry = registry_with(&[("vip", &[-1])]).await;
    let runner = runner(directory, registry);

    let request = OperationRequest::remove(TargetScope::group("vip"));
    let report = runner.run(&request).await.expect("batch");

    assert_eq!(report.results[0].label(), "Main / @straggler");
    assert!(report.summary().contains("ok       Main / @straggler"));
    assert!(report.summary().starts_with("remove results\n"));
}

#[tokio::test]
async fn test_reports_round_trip_through_json() {
    let directory = Arc::new(InMemoryDirectory::new());
    directory.add_channel(ChannelId(-1), "Main");
    directory.add_subject(SubjectId(7), "spammer");
    directory.fail_resolve(-2, DirectoryError::NotFound { id: -2 });
    let registry = registry_with(&[("vip", &[-1, -2])]).await;
    let runner = runner(directory, registry);

    let request = OperationRequest::restrict(Subject::new(SubjectId(7)), TargetScope::group("vip"));
    let report = runner.run(&request).await.expect("batch");

    let json = report.to_json().expect("serialize");
    let back: BatchReport = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, report);
    assert_eq!(back.skipped, 1);
}

#[tokio::test]
async fn test_batch_ids_are_unique_per_run() {
    let directory = Arc::new(InMemoryDirectory::new());
    directory.add_channel(ChannelId(-1), "Main");
    directory.add_subject(SubjectId(7), "spammer");
    let registry = registry_with(&[("vip", &[-1])]).await;
    let runner = runner(directory, registry);

    let request = OperationRequest::restrict(Subject::new(SubjectId(7)), TargetScope::group("vip"));
    let first = runner.run(&request).await.expect("first batch");
    let second = runner.run(&request).await.expect("second batch");

    assert_ne!(first.batch_id, second.batch_id);
}

#[tokio::test]
async fn test_rerun_classifies_identically() {
    let directory = Arc::new(InMemoryDirectory::new());
    directory.add_channel(ChannelId(-1), "Main");
    directory.add_channel(ChannelId(-2), "Backup");
    directory.add_subject(SubjectId(7), "spammer");
    // Same service responses for both runs: -2 denies twice, -3 never resolves.
    directory.script_apply(
        ChannelId(-2),
        vec![
            Err(DirectoryError::PermissionDenied),
            Err(DirectoryError::PermissionDenied),
        ],
    );
    directory.fail_resolve(-3, DirectoryError::NotFound { id: -3 });
    let registry = registry_with(&[("vip", &[-1, -2, -3])]).await;
    let runner = runner(directory, registry);

    let request = OperationRequest::restrict(Subject::new(SubjectId(7)), TargetScope::group("vip"));
    let first = runner.run(&request).await.expect("first batch");
    let second = runner.run(&request).await.expect("second batch");

    // One success, one failure, one skip, classified the same way each time.
    assert_eq!(first.results, second.results);
    assert_eq!(
        (first.succeeded, first.failed, first.skipped),
        (second.succeeded, second.failed, second.skipped)
    );
    assert_eq!((first.succeeded, first.failed, first.skipped), (1, 1, 1));
}

#[tokio::test]
async fn test_elapsed_includes_throttle_time() {
    let directory = Arc::new(InMemoryDirectory::new());
    directory.add_channel(ChannelId(-1), "Main");
    directory.add_channel(ChannelId(-2), "Backup");
    directory.add_subject(SubjectId(7), "spammer");
    let registry = registry_with(&[("vip", &[-1, -2])]).await;
    let runner = BatchRunner::builder()
        .with_directory(directory)
        .with_registry(registry)
        .with_throttle_interval(Duration::from_millis(30))
        .build()
        .expect("build runner");

    let request = OperationRequest::restrict(Subject::new(SubjectId(7)), TargetScope::group("vip"));
    let report = runner.run(&request).await.expect("batch");

    // Two rows, throttled after each.
    assert!(report.elapsed >= Duration::from_millis(60));
    assert!((report.success_rate() - 1.0).abs() < f64::EPSILON);
}
