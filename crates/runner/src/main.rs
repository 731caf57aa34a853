//! Connectors CI - batch runner entry point
//!
//! Starts the shared container daemon, runs every configured connector's
//! pipeline under the concurrency gates, publishes the completion report
//! and stops the daemon.

mod cli;
mod logging;
mod settings;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use cli::Cli;
use connectors_ci_core::application::{BatchConfig, BatchRunner};
use connectors_ci_core::domain::{ConnectorContext, ContextState, ReportIdentity};
use connectors_ci_core::port::time_provider::SystemTimeProvider;
use connectors_ci_core::port::{ReportStore, TimeProvider};
use connectors_ci_infra_sqlite::{create_pool, run_migrations, SqliteReportStore};
use connectors_ci_infra_system::{CommandPipeline, JsonFileReportStore, ProcessService};
use settings::{ReportSettings, RunnerSettings};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse arguments and initialize logging
    let cli = Cli::parse();
    logging::init_logging()?;

    info!("Connectors CI v{} starting...", VERSION);

    // 2. Load configuration
    let mut settings = RunnerSettings::load(cli.config.as_deref())
        .context("Failed to load runner settings")?;
    cli.apply(&mut settings);

    // 3. Setup dependencies (DI wiring)
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let store = build_report_store(&settings.report, time_provider.clone()).await?;

    let service = Arc::new(ProcessService::new(
        settings.service.to_process_config(),
        time_provider.clone(),
    ));

    let mut pipeline = CommandPipeline::new(time_provider.clone());
    if let Some(limit) = settings.command_timeout() {
        pipeline = pipeline.with_command_timeout(limit);
    }

    let mut batch_config = BatchConfig::new(&settings.pipeline_name, settings.concurrency_config());
    batch_config.exec_log_path = settings
        .exec_log_path()
        .context("Invalid execution log path")?;
    batch_config.execute_timeout = settings.execute_timeout();
    batch_config.keep_service_on_failure = settings.keep_service_on_failure;

    let runner = BatchRunner::new(batch_config, service, store);

    // 4. Build one context per connector
    let created_at = time_provider.now();
    let identity = ReportIdentity::new(report_prefix(&settings, created_at), created_at);
    let contexts = build_contexts(&settings, &identity);
    info!(
        connectors = contexts.len(),
        report_prefix = %identity.report_output_prefix,
        "Prepared connector contexts"
    );

    // 5. Run until done or interrupted
    let run = runner.run(contexts, Arc::new(pipeline), Arc::new(cli.extra_args.clone()));
    let finished = tokio::select! {
        result = run => result.context("Connectors pipelines failed")?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted. The shared daemon is killed with this process.");
            bail!("Interrupted");
        }
    };

    // 6. Summary
    let failed: Vec<&str> = finished
        .iter()
        .filter(|ctx| ctx.state != ContextState::Successful)
        .map(|ctx| ctx.connector.technical_name.as_str())
        .collect();

    for ctx in &finished {
        info!(
            connector = %ctx.connector.technical_name,
            state = %ctx.state,
            exit_code = ?ctx.exit_code,
            duration_ms = ?ctx.duration().map(|d| d.num_milliseconds()),
            "Connector finished"
        );
    }

    if !failed.is_empty() {
        bail!(
            "{} of {} connectors failed: {}",
            failed.len(),
            finished.len(),
            failed.join(", ")
        );
    }

    info!(connectors = finished.len(), "All connectors succeeded");
    Ok(())
}

async fn build_report_store(
    report: &ReportSettings,
    time_provider: Arc<dyn TimeProvider>,
) -> Result<Arc<dyn ReportStore>> {
    match report {
        ReportSettings::Sqlite { database_url } => {
            info!(database_url = %database_url, "Initializing report database...");
            let pool = create_pool(database_url)
                .await
                .context("DB pool creation failed")?;
            run_migrations(&pool).await.context("Migration failed")?;
            Ok(Arc::new(SqliteReportStore::new(pool, time_provider)))
        }
        ReportSettings::Json { directory } => {
            let root = shellexpand::tilde(directory).into_owned();
            info!(directory = %root, "Writing reports as JSON files");
            Ok(Arc::new(JsonFileReportStore::new(root)))
        }
    }
}

/// `{pipeline slug}/{UTC timestamp}` unless configured explicitly
fn report_prefix(settings: &RunnerSettings, now: DateTime<Utc>) -> String {
    if let Some(prefix) = &settings.report_prefix {
        return prefix.clone();
    }
    let slug: String = settings
        .pipeline_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    format!("{}/{}", slug.trim_matches('-'), now.format("%Y%m%dT%H%M%SZ"))
}

fn build_contexts(settings: &RunnerSettings, identity: &ReportIdentity) -> Vec<ConnectorContext> {
    let (username, password) = match &settings.registry {
        Some(registry) => (Some(registry.username.clone()), Some(registry.password.clone())),
        None => (None, None),
    };

    settings
        .connectors
        .iter()
        .map(|connector| {
            ConnectorContext::new(connector.to_connector(), identity.clone())
                .with_docker_hub_login(username.clone(), password.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors_ci_core::domain::{ConnectorLanguage, Secret, WorkUnit};
    use settings::{ConnectorSettings, RegistrySettings};

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_report_prefix_from_pipeline_name() {
        let settings = RunnerSettings {
            pipeline_name: "Nightly Java Build!".to_string(),
            ..Default::default()
        };
        assert_eq!(
            report_prefix(&settings, now()),
            "nightly-java-build/20231114T221320Z"
        );
    }

    #[test]
    fn test_report_prefix_override() {
        let settings = RunnerSettings {
            report_prefix: Some("custom/run-1".to_string()),
            ..Default::default()
        };
        assert_eq!(report_prefix(&settings, now()), "custom/run-1");
    }

    #[test]
    fn test_contexts_carry_registry_login() {
        let settings = RunnerSettings {
            registry: Some(RegistrySettings {
                username: "ci-bot".to_string(),
                password: Secret::new("hunter2"),
            }),
            connectors: vec![ConnectorSettings {
                technical_name: "source-postgres".to_string(),
                language: ConnectorLanguage::Java,
                command: vec!["true".to_string()],
                args: Vec::new(),
                working_dir: None,
            }],
            ..Default::default()
        };
        let identity = ReportIdentity::new("prefix", now());

        let contexts = build_contexts(&settings, &identity);
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].state, ContextState::Pending);

        let credentials = contexts[0].registry_credentials().unwrap();
        assert_eq!(credentials.username, "ci-bot");
        assert_eq!(credentials.password.expose(), "hunter2");
    }

    #[tokio::test]
    async fn test_json_store_selected() {
        let dir = tempfile::tempdir().unwrap();
        let report = ReportSettings::Json {
            directory: dir.path().display().to_string(),
        };
        let store = build_report_store(&report, Arc::new(SystemTimeProvider)).await;
        tokio_test::assert_ok!(store);
    }

    #[tokio::test]
    async fn test_sqlite_store_selected() {
        let report = ReportSettings::Sqlite {
            database_url: "sqlite::memory:".to_string(),
        };
        let store = build_report_store(&report, Arc::new(SystemTimeProvider)).await;
        tokio_test::assert_ok!(store);
    }
}
