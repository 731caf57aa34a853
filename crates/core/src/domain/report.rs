// Completion Report Domain Model

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::connector::{ConnectorLanguage, ContextState, ReportIdentity};

/// Binary outcome of one connector pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Success,
    Failure,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Success => write!(f, "SUCCESS"),
            StepStatus::Failure => write!(f, "FAILURE"),
        }
    }
}

/// Classified outcome of one work unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub connector: String,
    pub language: ConnectorLanguage,
    pub final_state: ContextState,
    pub status: StepStatus,
}

/// Aggregate of every result record of one batch.
///
/// Fields are private: a report is never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionReport {
    name: String,
    identity: ReportIdentity,
    filename: String,
    results: Vec<ResultRecord>,
}

impl CompletionReport {
    pub fn new(
        name: impl Into<String>,
        identity: ReportIdentity,
        filename: impl Into<String>,
        results: Vec<ResultRecord>,
    ) -> Self {
        Self {
            name: name.into(),
            identity,
            filename: filename.into(),
            results,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity(&self) -> &ReportIdentity {
        &self.identity
    }

    /// File stem used by file-based stores
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Records in input order
    pub fn results(&self) -> &[ResultRecord] {
        &self.results
    }

    pub fn success_count(&self) -> usize {
        self.count(StepStatus::Success)
    }

    pub fn failure_count(&self) -> usize {
        self.count(StepStatus::Failure)
    }

    pub fn is_successful(&self) -> bool {
        self.failure_count() == 0
    }

    fn count(&self, status: StepStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}
