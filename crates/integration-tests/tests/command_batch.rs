//! Real child processes: the daemon and connector commands

#![cfg(unix)]

use chrono::Utc;
use connectors_ci_core::application::{BatchConfig, BatchRunner, ConcurrencyConfig};
use connectors_ci_core::domain::{
    Connector, ConnectorContext, ConnectorLanguage, ContextState, ReportIdentity,
};
use connectors_ci_core::error::AppError;
use connectors_ci_core::port::report_store::mocks::InMemoryReportStore;
use connectors_ci_core::port::time_provider::SystemTimeProvider;
use connectors_ci_infra_system::{CommandPipeline, ProcessService, ProcessServiceConfig};
use std::sync::Arc;
use std::time::Duration;

fn sleeping_daemon() -> Arc<ProcessService> {
    let config = ProcessServiceConfig::new("fake-dockerd", "sleep")
        .with_args(["30"])
        .with_endpoint("tcp://127.0.0.1:2375");
    Arc::new(ProcessService::new(config, Arc::new(SystemTimeProvider)))
}

fn context(name: &str, command: &[&str]) -> ConnectorContext {
    ConnectorContext::new(
        Connector::new(name, ConnectorLanguage::Python).with_command(command.iter().copied()),
        ReportIdentity::new("local/1", Utc::now()),
    )
}

#[tokio::test]
async fn test_commands_run_against_daemon() {
    let daemon = sleeping_daemon();
    let store = Arc::new(InMemoryReportStore::new());
    let runner = BatchRunner::new(
        BatchConfig::new("Local", ConcurrencyConfig::new(2)),
        daemon.clone(),
        store.clone(),
    );
    let units = vec![
        context("source-ok", &["sh", "-c", "test \"$DOCKER_HOST\" = tcp://127.0.0.1:2375"]),
        context("source-fails", &["sh", "-c", "exit 1"]),
        context("source-args", &["sh", "-c", "test \"$0\" = --fast"]),
    ];

    let finished = runner
        .run(
            units,
            Arc::new(CommandPipeline::new(Arc::new(SystemTimeProvider))),
            Arc::new(vec!["--fast".to_string()]),
        )
        .await
        .unwrap();

    let states: Vec<_> = finished.iter().map(|c| c.state).collect();
    assert_eq!(
        states,
        vec![
            ContextState::Successful,
            ContextState::Failure,
            ContextState::Successful
        ]
    );
    assert!(!daemon.is_running().await);
    assert_eq!(store.reports()[0].failure_count(), 1);
}

#[tokio::test]
async fn test_batch_deadline_stops_daemon() {
    let daemon = sleeping_daemon();
    let mut config = BatchConfig::new("Local", ConcurrencyConfig::new(2));
    config.execute_timeout = Some(Duration::from_millis(200));
    let runner = BatchRunner::new(config, daemon.clone(), Arc::new(InMemoryReportStore::new()));

    let err = runner
        .run(
            vec![context("source-hangs", &["sleep", "10"])],
            Arc::new(CommandPipeline::new(Arc::new(SystemTimeProvider))),
            Arc::new(Vec::new()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Timeout(_)));
    assert!(!daemon.is_running().await);
}
