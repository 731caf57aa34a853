//! Runner settings
//!
//! Loaded from an optional TOML file, then `CONNECTORS_CI__*` environment
//! variables (`__` separates nested keys, e.g. `CONNECTORS_CI__REPORT__KIND`).

use config::{Config, ConfigError, Environment, File};
use connectors_ci_core::application::constants::DEFAULT_CONCURRENCY;
use connectors_ci_core::application::ConcurrencyConfig;
use connectors_ci_core::domain::{Connector, ConnectorLanguage, Secret};
use connectors_ci_infra_system::ProcessServiceConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "CONNECTORS_CI";
const DEFAULT_PIPELINE_NAME: &str = "Connectors CI";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    pub pipeline_name: String,
    pub concurrency: usize,

    /// Per-language gate capacities, e.g. `java = 1`
    pub overrides: HashMap<ConnectorLanguage, usize>,

    /// Daemon log file; stderr when unset
    pub exec_log_path: Option<String>,

    /// Deadline for the whole fan-out
    pub execute_timeout_secs: Option<u64>,

    /// Deadline for a single connector command
    pub command_timeout_secs: Option<u64>,

    pub keep_service_on_failure: bool,

    /// Report location override; defaults to `{pipeline}/{timestamp}`
    pub report_prefix: Option<String>,

    pub service: ServiceSettings,
    pub report: ReportSettings,
    pub registry: Option<RegistrySettings>,
    pub connectors: Vec<ConnectorSettings>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            pipeline_name: DEFAULT_PIPELINE_NAME.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            overrides: ConcurrencyConfig::default().class_overrides,
            exec_log_path: None,
            execute_timeout_secs: None,
            command_timeout_secs: None,
            keep_service_on_failure: false,
            report_prefix: None,
            service: ServiceSettings::default(),
            report: ReportSettings::default(),
            registry: None,
            connectors: Vec::new(),
        }
    }
}

impl RunnerSettings {
    /// Load settings from `path` (if any) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn concurrency_config(&self) -> ConcurrencyConfig {
        ConcurrencyConfig {
            default_capacity: self.concurrency,
            class_overrides: self.overrides.clone(),
        }
    }

    /// Execution log path with `~` and `$VARS` expanded
    pub fn exec_log_path(&self) -> Result<Option<PathBuf>, ConfigError> {
        self.exec_log_path
            .as_deref()
            .map(|raw| {
                shellexpand::full(raw)
                    .map(|expanded| PathBuf::from(expanded.into_owned()))
                    .map_err(|e| ConfigError::Message(format!("exec_log_path: {}", e)))
            })
            .transpose()
    }

    pub fn execute_timeout(&self) -> Option<Duration> {
        self.execute_timeout_secs.map(Duration::from_secs)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

/// How to launch the shared container daemon
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub readiness_probe: Option<Vec<String>>,
    pub endpoint: Option<String>,
    pub start_timeout_secs: u64,
    pub stop_grace_secs: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        let dockerd = ProcessServiceConfig::dockerd();
        Self {
            name: dockerd.name,
            command: dockerd.command,
            args: dockerd.args,
            readiness_probe: dockerd.readiness_probe,
            endpoint: dockerd.endpoint,
            start_timeout_secs: dockerd.start_timeout.as_secs(),
            stop_grace_secs: dockerd.stop_grace.as_secs(),
        }
    }
}

impl ServiceSettings {
    pub fn to_process_config(&self) -> ProcessServiceConfig {
        let mut config =
            ProcessServiceConfig::new(&self.name, &self.command).with_args(self.args.clone());
        config.readiness_probe = self.readiness_probe.clone();
        config.endpoint = self.endpoint.clone();
        config.start_timeout = Duration::from_secs(self.start_timeout_secs);
        config.stop_grace = Duration::from_secs(self.stop_grace_secs);
        config
    }
}

/// Where completion reports go
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReportSettings {
    Sqlite { database_url: String },
    Json { directory: String },
}

impl Default for ReportSettings {
    fn default() -> Self {
        let directory = directories::ProjectDirs::from("", "", "connectors-ci")
            .map(|dirs| dirs.data_dir().join("reports").display().to_string())
            .unwrap_or_else(|| "./reports".to_string());
        Self::Json { directory }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrySettings {
    pub username: String,
    pub password: Secret,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectorSettings {
    pub technical_name: String,
    pub language: ConnectorLanguage,

    /// Program and its fixed arguments
    #[serde(default)]
    pub command: Vec<String>,

    /// Appended after `command`
    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl ConnectorSettings {
    pub fn to_connector(&self) -> Connector {
        let mut connector = Connector::new(&self.technical_name, self.language)
            .with_command(self.command.iter().chain(self.args.iter()).cloned());
        connector.working_dir = self.working_dir.clone();
        connector
    }
}
