//! Batch scenarios across the limiter, lifecycle, scheduler and report
//! aggregator, driven through mock ports.

use chrono::Utc;
use connectors_ci_core::application::batch::mocks::{MockOutcome, RecordingPipeline};
use connectors_ci_core::application::{BatchConfig, BatchRunner, ConcurrencyConfig};
use connectors_ci_core::domain::{
    Connector, ConnectorContext, ConnectorLanguage, ContextState, ReportIdentity, StepStatus,
};
use connectors_ci_core::error::AppError;
use connectors_ci_core::port::report_store::mocks::InMemoryReportStore;
use connectors_ci_core::port::shared_service::mocks::MockSharedService;
use std::sync::Arc;
use std::time::Duration;

fn context(name: &str, language: ConnectorLanguage) -> ConnectorContext {
    ConnectorContext::new(
        Connector::new(name, language),
        ReportIdentity::new("nightly/42", Utc::now()),
    )
}

struct Harness {
    runner: BatchRunner,
    service: Arc<MockSharedService>,
    store: Arc<InMemoryReportStore>,
}

fn harness(concurrency: ConcurrencyConfig) -> Harness {
    let service = Arc::new(MockSharedService::new());
    let store = Arc::new(InMemoryReportStore::new());
    let runner = BatchRunner::new(
        BatchConfig::new("Nightly", concurrency),
        service.clone(),
        store.clone(),
    );
    Harness {
        runner,
        service,
        store,
    }
}

/// Five units under a default capacity of two
#[tokio::test]
async fn test_default_gate_bounds_parallelism() {
    let h = harness(ConcurrencyConfig::new(2));
    let pipeline = Arc::new(RecordingPipeline::new().with_default_delay(Duration::from_millis(30)));
    let units: Vec<_> = (0..5)
        .map(|i| context(&format!("source-{}", i), ConnectorLanguage::Python))
        .collect();

    let finished = h
        .runner
        .run(units, pipeline.clone(), Arc::new(Vec::new()))
        .await
        .unwrap();

    assert_eq!(finished.len(), 5);
    assert_eq!(pipeline.max_active(), 2);
    assert_eq!(h.service.start_calls(), 1);
    assert_eq!(h.service.stop_calls(), 1);

    let reports = h.store.reports();
    assert_eq!(reports.len(), 1);
    let names: Vec<_> = reports[0]
        .results()
        .iter()
        .map(|r| r.connector.clone())
        .collect();
    assert_eq!(
        names,
        vec!["source-0", "source-1", "source-2", "source-3", "source-4"]
    );
    assert_eq!(reports[0].name(), "Report upload nightly/42");
    assert_eq!(reports[0].filename(), "complete");
}

/// Java serialized on its own gate while Python keeps running in parallel
#[tokio::test]
async fn test_java_override_serializes_java_only() {
    let h = harness(ConcurrencyConfig::default());
    let pipeline = Arc::new(RecordingPipeline::new().with_default_delay(Duration::from_millis(30)));
    let units = vec![
        context("source-postgres", ConnectorLanguage::Java),
        context("source-faker", ConnectorLanguage::Python),
        context("source-mysql", ConnectorLanguage::Java),
        context("source-stripe", ConnectorLanguage::Python),
        context("destination-s3", ConnectorLanguage::Java),
        context("source-github", ConnectorLanguage::Python),
    ];

    let finished = h
        .runner
        .run(units, pipeline.clone(), Arc::new(Vec::new()))
        .await
        .unwrap();

    assert!(finished.iter().all(|c| c.state == ContextState::Successful));
    assert_eq!(pipeline.max_active_for(ConnectorLanguage::Java), 1);
    assert!(pipeline.max_active_for(ConnectorLanguage::Python) > 1);
}

/// Slow first unit still reported first
#[tokio::test]
async fn test_report_follows_input_order_not_completion_order() {
    let h = harness(ConcurrencyConfig::new(5));
    let pipeline = Arc::new(
        RecordingPipeline::new()
            .with_delay("source-slow", Duration::from_millis(80))
            .with_outcome("source-broken", MockOutcome::Fail)
            .with_outcome("source-crashing", MockOutcome::Error),
    );
    let units = vec![
        context("source-slow", ConnectorLanguage::Python),
        context("source-broken", ConnectorLanguage::LowCode),
        context("source-crashing", ConnectorLanguage::ManifestOnly),
    ];

    h.runner
        .run(units, pipeline.clone(), Arc::new(Vec::new()))
        .await
        .unwrap();

    assert_eq!(pipeline.finish_order().last().unwrap(), "source-slow");

    let report = &h.store.reports()[0];
    let statuses: Vec<_> = report
        .results()
        .iter()
        .map(|r| (r.connector.as_str(), r.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("source-slow", StepStatus::Success),
            ("source-broken", StepStatus::Failure),
            ("source-crashing", StepStatus::Failure),
        ]
    );
    assert_eq!(report.success_count(), 1);
    assert_eq!(report.failure_count(), 2);
}

#[tokio::test]
async fn test_empty_batch_touches_nothing() {
    let h = harness(ConcurrencyConfig::default());
    let pipeline = Arc::new(RecordingPipeline::new());

    let finished = h
        .runner
        .run(Vec::<ConnectorContext>::new(), pipeline.clone(), Arc::new(Vec::new()))
        .await
        .unwrap();

    assert!(finished.is_empty());
    assert_eq!(h.service.start_calls(), 0);
    assert_eq!(h.store.save_count(), 0);
    assert_eq!(pipeline.run_count(), 0);
}

#[tokio::test]
async fn test_unfinished_unit_is_configuration_error() {
    let h = harness(ConcurrencyConfig::new(2));
    let pipeline = Arc::new(
        RecordingPipeline::new().with_outcome("source-stuck", MockOutcome::LeavePending),
    );
    let units = vec![
        context("source-ok", ConnectorLanguage::Python),
        context("source-stuck", ConnectorLanguage::Python),
    ];

    let err = h
        .runner
        .run(units, pipeline, Arc::new(Vec::new()))
        .await
        .unwrap_err();

    assert!(err.is_configuration());
    assert_eq!(h.store.save_count(), 0);
    assert_eq!(h.service.stop_calls(), 1);
}

#[tokio::test]
async fn test_failing_task_cancels_batch() {
    let h = harness(ConcurrencyConfig::new(1));
    let pipeline = Arc::new(
        RecordingPipeline::new()
            .with_default_delay(Duration::from_millis(20))
            .with_outcome("source-0", MockOutcome::ReturnErr("boom".to_string())),
    );
    let units: Vec<_> = (0..4)
        .map(|i| context(&format!("source-{}", i), ConnectorLanguage::Python))
        .collect();

    let err = h
        .runner
        .run(units, pipeline.clone(), Arc::new(Vec::new()))
        .await
        .unwrap_err();

    match err {
        AppError::TaskFailed { connector, .. } => assert_eq!(connector, "source-0"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(h.store.save_count(), 0);
    assert!(!h.service.is_running());
    assert_eq!(pipeline.active(), 0);
}

#[tokio::test]
async fn test_panicking_pipeline_fails_batch_and_stops_service() {
    let h = harness(ConcurrencyConfig::new(2));
    let pipeline = Arc::new(
        RecordingPipeline::new()
            .with_outcome("source-bad", MockOutcome::Panic("corrupt catalog".to_string())),
    );
    let units = vec![
        context("source-ok", ConnectorLanguage::Python),
        context("source-bad", ConnectorLanguage::Python),
    ];

    let err = h
        .runner
        .run(units, pipeline, Arc::new(Vec::new()))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::TaskPanicked { ref connector, .. } if connector == "source-bad"));
    assert_eq!(h.service.stop_calls(), 1);
    assert_eq!(h.store.save_count(), 0);
}

/// Panic isolation only works when the shipped binary unwinds
#[test]
fn test_release_profile_unwinds_on_panic() {
    let manifest = include_str!("../../../Cargo.toml");
    let release: Vec<&str> = manifest
        .lines()
        .skip_while(|line| line.trim() != "[profile.release]")
        .skip(1)
        .take_while(|line| !line.trim_start().starts_with('['))
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| line.starts_with("panic"))
        .collect();

    assert!(
        release.iter().all(|line| !line.contains("abort")),
        "release profile aborts on panic: {:?}",
        release
    );
}
