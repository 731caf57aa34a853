// Shared daemon process adapter
// reason: tokio for async process management, nix for graceful signals
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{self, OpenOptions};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use connectors_ci_core::port::{
    LogDestination, ServiceError, ServiceHandle, ServiceOptions, SharedService, TimeProvider,
};

/// Environment variable carrying the registry username to the daemon
pub const DOCKER_HUB_USERNAME_ENV: &str = "DOCKER_HUB_USERNAME";

/// Environment variable carrying the registry password to the daemon
pub const DOCKER_HUB_PASSWORD_ENV: &str = "DOCKER_HUB_PASSWORD";

/// How to launch and supervise the shared daemon
#[derive(Debug, Clone)]
pub struct ProcessServiceConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,

    /// Command that exits 0 once the daemon accepts work. No probe means
    /// the daemon counts as ready as soon as it is spawned.
    pub readiness_probe: Option<Vec<String>>,

    /// Address tasks use to reach the daemon
    pub endpoint: Option<String>,

    pub start_timeout: Duration,
    pub probe_interval: Duration,

    /// Time between SIGTERM and SIGKILL on stop
    pub stop_grace: Duration,
}

impl ProcessServiceConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            readiness_probe: None,
            endpoint: None,
            start_timeout: Duration::from_secs(60),
            probe_interval: Duration::from_millis(500),
            stop_grace: Duration::from_secs(10),
        }
    }

    /// Local docker daemon probed with `docker info`
    pub fn dockerd() -> Self {
        Self::new("dockerd", "dockerd")
            .with_readiness_probe(["docker", "info"])
            .with_endpoint("unix:///var/run/docker.sock")
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_readiness_probe<I, S>(mut self, probe: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.readiness_probe = Some(probe.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

/// Runs the shared daemon as a child process
pub struct ProcessService {
    config: ProcessServiceConfig,
    time_provider: Arc<dyn TimeProvider>,
    child: Mutex<Option<Child>>,
}

impl ProcessService {
    pub fn new(config: ProcessServiceConfig, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            config,
            time_provider,
            child: Mutex::new(None),
        }
    }

    pub async fn is_running(&self) -> bool {
        match self.child.lock().await.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Poll the readiness probe until it succeeds, the daemon exits, or
    /// the start timeout elapses
    async fn wait_until_ready(&self, child: &mut Child) -> Result<(), ServiceError> {
        let Some((program, probe_args)) = self
            .config
            .readiness_probe
            .as_ref()
            .and_then(|probe| probe.split_first())
        else {
            return Ok(());
        };

        let started = Instant::now();
        loop {
            let exited = child
                .try_wait()
                .map_err(|e| ServiceError::StartFailed(e.to_string()))?;
            if let Some(status) = exited {
                return Err(ServiceError::StartFailed(format!(
                    "{} exited during startup ({})",
                    self.config.name, status
                )));
            }

            let ready = Command::new(program)
                .args(probe_args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map(|status| status.success())
                .unwrap_or(false);
            if ready {
                debug!(service = %self.config.name, elapsed_ms = started.elapsed().as_millis() as u64, "Readiness probe passed");
                return Ok(());
            }

            if started.elapsed() >= self.config.start_timeout {
                return Err(ServiceError::NotReady(
                    self.config.start_timeout.as_millis() as u64,
                ));
            }
            sleep(self.config.probe_interval).await;
        }
    }

    /// SIGTERM first, then SIGKILL after the grace period
    async fn terminate(&self, child: &mut Child) -> Result<(), ServiceError> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = child.id() {
                info!(pid = %pid, "Sending SIGTERM for graceful shutdown");
                kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
                    .map_err(|e| ServiceError::StopFailed(format!("SIGTERM failed: {}", e)))?;

                match timeout(self.config.stop_grace, child.wait()).await {
                    Ok(Ok(status)) => {
                        info!(pid = %pid, status = %status, "Shared service exited after SIGTERM");
                        return Ok(());
                    }
                    Ok(Err(e)) => return Err(ServiceError::StopFailed(e.to_string())),
                    Err(_) => {
                        warn!(pid = %pid, "Shared service did not exit after SIGTERM, sending SIGKILL");
                    }
                }
            }
        }

        child
            .kill()
            .await
            .map_err(|e| ServiceError::StopFailed(format!("kill failed: {}", e)))
    }
}

/// Stdout/stderr targets for the daemon
async fn log_output(destination: &LogDestination) -> Result<(Stdio, Stdio), ServiceError> {
    match destination {
        LogDestination::Stderr => Ok((
            Stdio::from(std::io::stderr()),
            Stdio::from(std::io::stderr()),
        )),
        LogDestination::File(path) => {
            let log_error = |e: std::io::Error| ServiceError::LogOutput {
                path: path.clone(),
                message: e.to_string(),
            };
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).await.map_err(log_error)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .map_err(log_error)?
                .into_std()
                .await;
            let second = file.try_clone().map_err(log_error)?;
            Ok((Stdio::from(file), Stdio::from(second)))
        }
    }
}

#[async_trait]
impl SharedService for ProcessService {
    async fn start(&self, options: &ServiceOptions) -> Result<ServiceHandle, ServiceError> {
        let mut slot = self.child.lock().await;
        if slot.is_some() {
            return Err(ServiceError::StartFailed(format!(
                "{} is already running",
                self.config.name
            )));
        }

        let (stdout, stderr) = log_output(&options.log_output).await?;
        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true);
        if let Some(credentials) = &options.credentials {
            command
                .env(DOCKER_HUB_USERNAME_ENV, &credentials.username)
                .env(DOCKER_HUB_PASSWORD_ENV, credentials.password.expose());
        }

        info!(
            service = %self.config.name,
            command = %self.config.command,
            args = ?self.config.args,
            "Spawning shared service"
        );
        let mut child = command.spawn().map_err(|e| {
            ServiceError::StartFailed(format!("{}: {}", self.config.command, e))
        })?;

        if let Err(e) = self.wait_until_ready(&mut child).await {
            warn!(service = %self.config.name, error = %e, "Shared service failed to become ready");
            let _ = child.kill().await;
            return Err(e);
        }

        let mut handle =
            ServiceHandle::new(&self.config.name, self.time_provider.now()).with_pid(child.id());
        if let Some(endpoint) = &self.config.endpoint {
            handle = handle.with_endpoint(endpoint);
        }
        *slot = Some(child);
        Ok(handle)
    }

    async fn stop(&self, handle: &ServiceHandle) -> Result<(), ServiceError> {
        let mut slot = self.child.lock().await;
        let Some(mut child) = slot.take() else {
            return Err(ServiceError::StopFailed(format!(
                "{} is not running",
                handle.name()
            )));
        };

        let exited = child
            .try_wait()
            .map_err(|e| ServiceError::StopFailed(e.to_string()))?;
        if let Some(status) = exited {
            warn!(service = %handle.name(), status = %status, "Shared service had already exited");
            return Ok(());
        }

        self.terminate(&mut child).await
    }
}
