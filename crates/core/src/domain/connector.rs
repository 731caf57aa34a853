// Connector Domain Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::domain::error::{DomainError, Result};

/// Implementation language of a connector.
///
/// This is the class key the concurrency limiter uses to pick a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectorLanguage {
    Python,
    Java,
    LowCode,
    ManifestOnly,
}

impl ConnectorLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorLanguage::Python => "python",
            ConnectorLanguage::Java => "java",
            ConnectorLanguage::LowCode => "low-code",
            ConnectorLanguage::ManifestOnly => "manifest-only",
        }
    }
}

impl fmt::Display for ConnectorLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectorLanguage {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "python" => Ok(ConnectorLanguage::Python),
            "java" => Ok(ConnectorLanguage::Java),
            "low-code" => Ok(ConnectorLanguage::LowCode),
            "manifest-only" => Ok(ConnectorLanguage::ManifestOnly),
            other => Err(DomainError::UnknownLanguage(other.to_string())),
        }
    }
}

/// Context State
///
/// `Successful`, `Failure` and `Error` are terminal. A context still in
/// `Pending` or `Running` after its pipeline returned cannot be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContextState {
    Pending,
    Running,
    Successful,
    Failure,
    Error,
}

impl ContextState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ContextState::Successful | ContextState::Failure | ContextState::Error
        )
    }
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextState::Pending => write!(f, "PENDING"),
            ContextState::Running => write!(f, "RUNNING"),
            ContextState::Successful => write!(f, "SUCCESSFUL"),
            ContextState::Failure => write!(f, "FAILURE"),
            ContextState::Error => write!(f, "ERROR"),
        }
    }
}

/// A string that never shows up in logs
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Image registry login forwarded to the shared container daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: Secret,
}

/// Identity used to place a report among the reports of sibling batches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportIdentity {
    pub report_output_prefix: String,
    pub created_at: DateTime<Utc>,
}

impl ReportIdentity {
    pub fn new(report_output_prefix: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            report_output_prefix: report_output_prefix.into(),
            created_at,
        }
    }
}

/// One independently schedulable unit of a batch.
///
/// The scheduler only reads the class key and label, and the classifier
/// reads the state. Everything else belongs to the work function.
pub trait WorkUnit: Send + 'static {
    /// Name used for logging and task labels
    fn label(&self) -> &str;

    /// Key selecting the concurrency gate
    fn class_key(&self) -> ConnectorLanguage;

    fn state(&self) -> ContextState;

    fn set_state(&mut self, state: ContextState);

    /// Identity reused by the completion report
    fn report_identity(&self) -> ReportIdentity;

    /// Registry login, if both username and password are known
    fn registry_credentials(&self) -> Option<RegistryCredentials> {
        None
    }
}

/// Static description of a connector under test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connector {
    pub technical_name: String,
    pub language: ConnectorLanguage,

    /// Program followed by its arguments
    #[serde(default)]
    pub command: Vec<String>,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl Connector {
    pub fn new(technical_name: impl Into<String>, language: ConnectorLanguage) -> Self {
        Self {
            technical_name: technical_name.into(),
            language,
            command: Vec::new(),
            working_dir: None,
        }
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }
}

/// Per-connector pipeline context
#[derive(Debug, Clone)]
pub struct ConnectorContext {
    pub connector: Connector,
    pub state: ContextState,
    pub identity: ReportIdentity,

    pub docker_hub_username: Option<String>,
    pub docker_hub_password: Option<Secret>,

    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
}

impl ConnectorContext {
    pub fn new(connector: Connector, identity: ReportIdentity) -> Self {
        Self {
            connector,
            state: ContextState::Pending,
            identity,
            docker_hub_username: None,
            docker_hub_password: None,
            started_at: None,
            finished_at: None,
            exit_code: None,
        }
    }

    pub fn with_docker_hub_login(
        mut self,
        username: Option<String>,
        password: Option<Secret>,
    ) -> Self {
        self.docker_hub_username = username;
        self.docker_hub_password = password;
        self
    }

    /// Transition to Running state with explicit timestamp
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.state != ContextState::Pending {
            return Err(self.invalid_transition(ContextState::Running));
        }
        self.state = ContextState::Running;
        self.started_at = Some(now);
        Ok(())
    }

    /// Transition to a terminal state with explicit timestamp
    pub fn finish(&mut self, state: ContextState, now: DateTime<Utc>) -> Result<()> {
        if !state.is_terminal() || self.state.is_terminal() {
            return Err(self.invalid_transition(state));
        }
        self.state = state;
        self.finished_at = Some(now);
        Ok(())
    }

    /// Wall-clock duration of the pipeline, once finished
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    fn invalid_transition(&self, to: ContextState) -> DomainError {
        DomainError::InvalidStateTransition {
            connector: self.connector.technical_name.clone(),
            from: self.state.to_string(),
            to: to.to_string(),
        }
    }
}

impl WorkUnit for ConnectorContext {
    fn label(&self) -> &str {
        &self.connector.technical_name
    }

    fn class_key(&self) -> ConnectorLanguage {
        self.connector.language
    }

    fn state(&self) -> ContextState {
        self.state
    }

    fn set_state(&mut self, state: ContextState) {
        self.state = state;
    }

    fn report_identity(&self) -> ReportIdentity {
        self.identity.clone()
    }

    fn registry_credentials(&self) -> Option<RegistryCredentials> {
        match (&self.docker_hub_username, &self.docker_hub_password) {
            (Some(username), Some(password)) => Some(RegistryCredentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn context(name: &str) -> ConnectorContext {
        let created_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        ConnectorContext::new(
            Connector::new(name, ConnectorLanguage::Python),
            ReportIdentity::new("reports/test", created_at),
        )
    }

    #[test]
    fn test_language_parsing() {
        assert_eq!(
            "java".parse::<ConnectorLanguage>().unwrap(),
            ConnectorLanguage::Java
        );
        assert_eq!(
            "LOW_CODE".parse::<ConnectorLanguage>().unwrap(),
            ConnectorLanguage::LowCode
        );
        assert!("cobol".parse::<ConnectorLanguage>().is_err());
    }

    #[test]
    fn test_context_lifecycle() {
        let mut ctx = context("source-faker");
        let now = Utc::now();

        assert_eq!(ctx.state, ContextState::Pending);
        assert!(ctx.start(now).is_ok());
        assert_eq!(ctx.state, ContextState::Running);
        assert!(ctx.finish(ContextState::Successful, now).is_ok());
        assert_eq!(ctx.state, ContextState::Successful);
        assert!(ctx.duration().is_some());
    }

    #[test]
    fn test_invalid_transitions() {
        let mut ctx = context("source-faker");
        let now = Utc::now();

        // Running is not terminal
        assert!(ctx.finish(ContextState::Running, now).is_err());

        ctx.start(now).unwrap();
        assert!(ctx.start(now).is_err());

        ctx.finish(ContextState::Failure, now).unwrap();
        assert!(ctx.finish(ContextState::Successful, now).is_err());
    }

    #[test]
    fn test_credentials_require_both_fields() {
        let ctx = context("source-faker").with_docker_hub_login(Some("bot".into()), None);
        assert!(ctx.registry_credentials().is_none());

        let ctx = context("source-faker")
            .with_docker_hub_login(Some("bot".into()), Some(Secret::new("hunter2")));
        let creds = ctx.registry_credentials().unwrap();
        assert_eq!(creds.username, "bot");
        assert_eq!(creds.password.expose(), "hunter2");
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
