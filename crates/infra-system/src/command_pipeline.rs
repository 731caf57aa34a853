// Command pipeline (connector work function)
// Runs each connector's configured command while holding its concurrency gate
use async_trait::async_trait;
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{error, info, warn};

use connectors_ci_core::application::{ConcurrencyGate, ConnectorPipeline, TaskEnv};
use connectors_ci_core::domain::{ConnectorContext, ContextState};
use connectors_ci_core::error::Result;
use connectors_ci_core::port::TimeProvider;

/// Environment variable exposing the task label to the connector command
pub const PIPELINE_LABEL_ENV: &str = "CONNECTORS_CI_PIPELINE";

/// Environment variable pointing the connector command at the shared daemon
pub const DOCKER_HOST_ENV: &str = "DOCKER_HOST";

/// Number of trailing stderr lines logged for a failing command
const STDERR_TAIL_LINES: usize = 20;

/// Work function running `connector.command` plus the batch's extra args.
///
/// Exit 0 leaves the context Successful, any other exit code Failure. A
/// command that cannot be spawned or exceeds `command_timeout` leaves it
/// in Error. None of these abort the batch.
pub struct CommandPipeline {
    time_provider: Arc<dyn TimeProvider>,
    command_timeout: Option<Duration>,
}

impl CommandPipeline {
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            time_provider,
            command_timeout: None,
        }
    }

    pub fn with_command_timeout(mut self, limit: Duration) -> Self {
        self.command_timeout = Some(limit);
        self
    }

    async fn execute(
        &self,
        ctx: &mut ConnectorContext,
        env: &TaskEnv,
        extra_args: &[String],
    ) -> ContextState {
        let name = ctx.connector.technical_name.clone();
        let Some((program, args)) = ctx.connector.command.split_first() else {
            warn!(connector = %name, "No command configured for connector");
            return ContextState::Error;
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .args(extra_args)
            .env(PIPELINE_LABEL_ENV, &env.pipeline_label)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(endpoint) = env.service.endpoint() {
            command.env(DOCKER_HOST_ENV, endpoint);
        }
        if let Some(dir) = &ctx.connector.working_dir {
            command.current_dir(dir);
        }

        info!(connector = %name, program = %program, args = ?args, "Running connector command");
        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(connector = %name, error = %e, "Failed to spawn connector command");
                return ContextState::Error;
            }
        };

        let waited = match self.command_timeout {
            Some(limit) => match timeout(limit, child.wait_with_output()).await {
                Ok(waited) => waited,
                Err(_) => {
                    // Child is killed on drop
                    warn!(connector = %name, timeout = ?limit, "Connector command timed out");
                    return ContextState::Error;
                }
            },
            None => child.wait_with_output().await,
        };

        match waited {
            Ok(output) => {
                ctx.exit_code = output.status.code();
                classify_output(&name, &output)
            }
            Err(e) => {
                error!(connector = %name, error = %e, "Failed to wait for connector command");
                ContextState::Error
            }
        }
    }
}

fn classify_output(name: &str, output: &Output) -> ContextState {
    if output.status.success() {
        info!(connector = %name, "Connector command succeeded");
        return ContextState::Successful;
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().collect();
    let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
    warn!(
        connector = %name,
        exit_code = ?output.status.code(),
        stderr_tail = %tail,
        "Connector command failed"
    );
    ContextState::Failure
}

#[async_trait]
impl ConnectorPipeline<ConnectorContext> for CommandPipeline {
    type Args = Vec<String>;

    async fn run(
        &self,
        ctx: &mut ConnectorContext,
        gate: ConcurrencyGate,
        env: &TaskEnv,
        args: &Self::Args,
    ) -> Result<()> {
        ctx.start(self.time_provider.now())?;

        // The slot is held only while the command runs
        let state = {
            let _permit = gate.acquire().await?;
            self.execute(ctx, env, args).await
        };

        ctx.finish(state, self.time_provider.now())?;
        Ok(())
    }
}
