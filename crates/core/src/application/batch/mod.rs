//! Batch Runner - Fan-out/fan-in of connector pipelines
//!
//! One batch:
//! 1. starts the shared service (skipped entirely for an empty batch)
//! 2. spawns one task per work unit, each handed the gate of its language
//! 3. waits for every task, or cancels the rest on the first failure
//! 4. stops the shared service
//! 5. classifies every unit and saves one completion report

pub mod mocks;
mod panic;

pub use panic::{guard_panics, PanicGuardResult};

use crate::application::constants::PIPELINE_LABEL_SEPARATOR;
use crate::application::lifecycle::ServiceLifecycle;
use crate::application::limiter::{ConcurrencyConfig, ConcurrencyGate, ConcurrencyLimiter};
use crate::application::report::ReportAggregator;
use crate::domain::WorkUnit;
use crate::error::{AppError, Result};
use crate::port::{LogDestination, ReportStore, ServiceHandle, ServiceOptions, SharedService};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Settings of one batch
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Label prefix of every task
    pub pipeline_name: String,
    pub concurrency: ConcurrencyConfig,

    /// Service execution logs go here, or to stderr when unset
    pub exec_log_path: Option<PathBuf>,

    /// End-to-end limit for the fan-out; no limit when unset
    pub execute_timeout: Option<Duration>,

    /// Leave the shared service running when the batch fails
    pub keep_service_on_failure: bool,
}

impl BatchConfig {
    pub fn new(pipeline_name: impl Into<String>, concurrency: ConcurrencyConfig) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            concurrency,
            exec_log_path: None,
            execute_timeout: None,
            keep_service_on_failure: false,
        }
    }

    fn log_destination(&self) -> LogDestination {
        self.exec_log_path
            .clone()
            .map(LogDestination::File)
            .unwrap_or_default()
    }
}

/// Per-task environment built by the runner
#[derive(Debug, Clone)]
pub struct TaskEnv {
    /// `"{pipeline_name} - {unit label}"`
    pub pipeline_label: String,
    pub service: Arc<ServiceHandle>,
}

/// Work function run once per unit.
///
/// Implementations must leave the unit in a terminal state before returning
/// `Ok`, and should hold the gate only around their heavy section. Returning
/// `Err` is an unrecoverable failure that aborts the whole batch.
#[async_trait]
pub trait ConnectorPipeline<W: WorkUnit>: Send + Sync + 'static {
    /// Extra arguments forwarded verbatim to every invocation
    type Args: Send + Sync + 'static;

    async fn run(
        &self,
        unit: &mut W,
        gate: ConcurrencyGate,
        env: &TaskEnv,
        args: &Self::Args,
    ) -> Result<()>;
}

/// Runs connector pipelines for a list of work units
pub struct BatchRunner {
    config: BatchConfig,
    lifecycle: ServiceLifecycle,
    reports: ReportAggregator,
}

impl BatchRunner {
    pub fn new(
        config: BatchConfig,
        service: Arc<dyn SharedService>,
        store: Arc<dyn ReportStore>,
    ) -> Self {
        Self {
            config,
            lifecycle: ServiceLifecycle::new(service),
            reports: ReportAggregator::new(store),
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Run `pipeline` for every unit and return the units in input order.
    ///
    /// # Errors
    /// - AppError::Config for invalid gate capacities or an unclassifiable unit
    /// - AppError::Service if the shared service fails to start or stop
    /// - AppError::TaskFailed / TaskPanicked for the first failing pipeline
    /// - AppError::Timeout if `execute_timeout` elapsed
    pub async fn run<W, P>(
        &self,
        units: Vec<W>,
        pipeline: Arc<P>,
        args: Arc<P::Args>,
    ) -> Result<Vec<W>>
    where
        W: WorkUnit,
        P: ConnectorPipeline<W>,
    {
        info!(
            pipeline = %self.config.pipeline_name,
            units = units.len(),
            execute_timeout = ?self.config.execute_timeout,
            "Starting connectors pipelines"
        );

        if units.is_empty() {
            info!("No connector contexts to run");
            return Ok(units);
        }

        let limiter = ConcurrencyLimiter::new(&self.config.concurrency)?;
        let options = ServiceOptions {
            log_output: self.config.log_destination(),
            credentials: units[0].registry_credentials(),
        };
        let running = self.lifecycle.start(&options).await?;

        match self
            .fan_out(units, &limiter, running.handle(), pipeline, args)
            .await
        {
            Ok(units) => {
                info!("All connector pipelines finished");
                let stopped = running.stop().await;

                // A stop failure must not cost the batch its report
                if let Err(e) = self.reports.publish(&units).await {
                    if let Err(stop_err) = &stopped {
                        warn!(error = %stop_err, "Shared service stop also failed");
                    }
                    return Err(e);
                }
                stopped?;

                info!(pipeline = %self.config.pipeline_name, "Batch complete");
                Ok(units)
            }
            Err(e) => {
                if self.config.keep_service_on_failure {
                    running.detach();
                } else if let Err(stop_err) = running.stop().await {
                    warn!(error = %stop_err, "Failed to stop shared service after batch failure");
                }
                Err(e)
            }
        }
    }

    async fn fan_out<W, P>(
        &self,
        units: Vec<W>,
        limiter: &ConcurrencyLimiter,
        service: Arc<ServiceHandle>,
        pipeline: Arc<P>,
        args: Arc<P::Args>,
    ) -> Result<Vec<W>>
    where
        W: WorkUnit,
        P: ConnectorPipeline<W>,
    {
        let labels: Vec<String> = units.iter().map(|u| u.label().to_string()).collect();
        let mut tasks = JoinSet::new();

        for (index, unit) in units.into_iter().enumerate() {
            let gate = limiter.gate_for(unit.class_key());
            let env = TaskEnv {
                pipeline_label: format!(
                    "{}{}{}",
                    self.config.pipeline_name,
                    PIPELINE_LABEL_SEPARATOR,
                    unit.label()
                ),
                service: Arc::clone(&service),
            };
            let span = info_span!(
                "connector_pipeline",
                connector = %unit.label(),
                language = %unit.class_key()
            );
            debug!(
                connector = %unit.label(),
                gate_capacity = gate.capacity(),
                "Spawning connector pipeline"
            );

            let pipeline = Arc::clone(&pipeline);
            let args = Arc::clone(&args);
            tasks.spawn(
                async move {
                    let outcome = guard_panics(run_task(pipeline, unit, gate, env, args)).await;
                    (index, outcome)
                }
                .instrument(span),
            );
        }

        let deadline = self
            .config
            .execute_timeout
            .map(|limit| (Instant::now() + limit, limit));
        let mut finished: Vec<Option<W>> = labels.iter().map(|_| None).collect();

        loop {
            let joined = match deadline {
                Some((at, limit)) => match timeout_at(at, tasks.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        error!(timeout = ?limit, "Batch timed out, cancelling remaining pipelines");
                        tasks.shutdown().await;
                        return Err(AppError::Timeout(limit));
                    }
                },
                None => tasks.join_next().await,
            };
            let Some(joined) = joined else {
                break;
            };

            let failure = match joined {
                Ok((index, PanicGuardResult::Success(Ok(unit)))) => {
                    info!(
                        connector = %unit.label(),
                        state = %unit.state(),
                        "Connector pipeline finished"
                    );
                    finished[index] = Some(unit);
                    continue;
                }
                Ok((index, PanicGuardResult::Success(Err(e)))) => AppError::TaskFailed {
                    connector: labels[index].clone(),
                    source: Box::new(e),
                },
                Ok((index, PanicGuardResult::Panicked(message))) => AppError::TaskPanicked {
                    connector: labels[index].clone(),
                    message,
                },
                Err(join_err) => AppError::TaskCancelled(join_err.to_string()),
            };

            error!(error = %failure, "Cancelling remaining connector pipelines");
            tasks.shutdown().await;
            return Err(failure);
        }

        finished
            .into_iter()
            .zip(labels)
            .map(|(unit, label)| {
                unit.ok_or_else(|| AppError::Internal(format!("no result for {}", label)))
            })
            .collect()
    }
}

async fn run_task<W, P>(
    pipeline: Arc<P>,
    mut unit: W,
    gate: ConcurrencyGate,
    env: TaskEnv,
    args: Arc<P::Args>,
) -> Result<W>
where
    W: WorkUnit,
    P: ConnectorPipeline<W>,
{
    pipeline.run(&mut unit, gate, &env, &args).await?;
    Ok(unit)
}
