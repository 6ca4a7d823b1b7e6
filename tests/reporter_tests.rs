// Correlated reporter tests

mod common;

use common::FakeSource;
use sidecar::models::TaskOutcome;
use sidecar::reporter::{self, TaskFailed};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("backtest diverged at step {0}")]
struct Diverged(u32);

#[tokio::test(start_paused = true)]
async fn test_failing_task_after_two_seconds_keeps_two_samples_and_error() {
    let source = FakeSource::constant(42.0);
    let result = reporter::run(source.clone(), Duration::from_secs(1), || async {
        tokio::time::sleep(Duration::from_secs(2)).await;
        Err::<(), _>(Diverged(7))
    })
    .await;

    let TaskFailed { error, report } = result.unwrap_err();
    assert_eq!(error, Diverged(7));
    assert_eq!(report.session.samples.len(), 2);
    assert!(report.session.is_sealed());
    match &report.task_result {
        TaskOutcome::Failed { error } => assert_eq!(error, "backtest diverged at step 7"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(report.wall_clock_ms, 2_000);
    // The sampler is gone: no further collections happen.
    let calls = source.calls();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(source.calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_successful_task_value_is_embedded() {
    let report = reporter::run(FakeSource::sequence(vec![10.0, 90.0]), Duration::from_secs(1), || async {
        tokio::time::sleep(Duration::from_millis(3_000)).await;
        Ok::<_, Diverged>("done")
    })
    .await
    .unwrap();

    assert_eq!(report.task_result, TaskOutcome::Completed { value: "done" });
    assert_eq!(report.session.samples.len(), 3);
    assert_eq!(report.session.summary.unwrap().cpu.peak, 90.0);
    assert!(report.session.ended_at.unwrap() >= report.session.samples[2].timestamp);
}

#[tokio::test(start_paused = true)]
async fn test_instant_task_yields_empty_sealed_session() {
    let report = reporter::run(FakeSource::constant(1.0), Duration::from_secs(2), || async {
        Ok::<_, Diverged>(5)
    })
    .await
    .unwrap();
    assert!(report.session.is_sealed());
    assert!(report.session.samples.is_empty());
    assert_eq!(report.session.summary.unwrap().sample_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_report_serializes_with_status_tag() {
    let report = reporter::run(FakeSource::constant(1.0), Duration::from_secs(1), || async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok::<_, Diverged>(3u32)
    })
    .await
    .unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["taskResult"]["status"], "completed");
    assert_eq!(json["taskResult"]["value"], 3);
    assert_eq!(json["session"]["samples"].as_array().unwrap().len(), 1);
}
