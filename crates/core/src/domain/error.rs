// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid context state transition for {connector}: {from} -> {to}")]
    InvalidStateTransition {
        connector: String,
        from: String,
        to: String,
    },

    #[error("Could not convert context state {state} of {connector} to a step status")]
    UnclassifiableState { connector: String, state: String },

    #[error("Unknown connector language: {0}")]
    UnknownLanguage(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
