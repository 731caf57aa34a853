// Central Error Type for the Application

use std::time::Duration;
use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Shared service error: {0}")]
    Service(#[from] crate::port::ServiceError),

    #[error("Connector pipeline failed for {connector}: {source}")]
    TaskFailed {
        connector: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("Connector pipeline panicked for {connector}: {message}")]
    TaskPanicked { connector: String, message: String },

    #[error("Connector pipeline cancelled for {0}")]
    TaskCancelled(String),

    #[error("Batch execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// True for errors caused by a work unit reaching an unclassifiable state
    /// or by invalid batch settings.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AppError::Config(_)
                | AppError::Domain(crate::domain::DomainError::UnclassifiableState { .. })
        )
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
