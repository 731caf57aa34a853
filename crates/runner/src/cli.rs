//! Command-line arguments
//!
//! Every flag overrides the matching setting loaded from file/environment.

use crate::settings::RunnerSettings;
use clap::Parser;
use connectors_ci_core::domain::ConnectorLanguage;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "connectors-ci")]
#[command(about = "Run connector CI pipelines against a shared container daemon", long_about = None)]
#[command(version)]
pub struct Cli {
    /// TOML settings file
    #[arg(short, long, env = "CONNECTORS_CI_CONFIG")]
    pub config: Option<PathBuf>,

    /// Batch name used in task labels
    #[arg(long)]
    pub pipeline_name: Option<String>,

    /// Default number of pipelines in flight
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Per-language capacity, e.g. `--override java=1` (repeatable)
    #[arg(long = "override", value_name = "LANGUAGE=N", value_parser = parse_override)]
    pub overrides: Vec<(ConnectorLanguage, usize)>,

    /// Daemon log file (stderr when unset)
    #[arg(long)]
    pub exec_log: Option<String>,

    /// Deadline for the whole batch, in seconds
    #[arg(long, value_name = "SECS")]
    pub execute_timeout: Option<u64>,

    /// Deadline for each connector command, in seconds
    #[arg(long, value_name = "SECS")]
    pub command_timeout: Option<u64>,

    /// Leave the daemon running if the batch fails
    #[arg(long)]
    pub keep_service_on_failure: bool,

    /// Only run these connectors (repeatable)
    #[arg(short = 'n', long = "connector", value_name = "TECHNICAL_NAME")]
    pub only: Vec<String>,

    /// Extra arguments appended to every connector command
    #[arg(last = true)]
    pub extra_args: Vec<String>,
}

fn parse_override(raw: &str) -> Result<(ConnectorLanguage, usize), String> {
    let (language, capacity) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected LANGUAGE=N, got '{}'", raw))?;
    let language: ConnectorLanguage = language.parse().map_err(|e| format!("{}", e))?;
    let capacity: usize = capacity
        .trim()
        .parse()
        .map_err(|_| format!("invalid capacity '{}'", capacity))?;
    Ok((language, capacity))
}

impl Cli {
    /// Apply flags on top of loaded settings
    pub fn apply(&self, settings: &mut RunnerSettings) {
        if let Some(name) = &self.pipeline_name {
            settings.pipeline_name = name.clone();
        }
        if let Some(concurrency) = self.concurrency {
            settings.concurrency = concurrency;
        }
        for (language, capacity) in &self.overrides {
            settings.overrides.insert(*language, *capacity);
        }
        if let Some(path) = &self.exec_log {
            settings.exec_log_path = Some(path.clone());
        }
        if let Some(secs) = self.execute_timeout {
            settings.execute_timeout_secs = Some(secs);
        }
        if let Some(secs) = self.command_timeout {
            settings.command_timeout_secs = Some(secs);
        }
        if self.keep_service_on_failure {
            settings.keep_service_on_failure = true;
        }
        if !self.only.is_empty() {
            settings
                .connectors
                .retain(|c| self.only.iter().any(|name| name == &c.technical_name));
        }
    }
}
