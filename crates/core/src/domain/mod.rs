// Domain Layer - Pure business logic and entities

pub mod connector;
pub mod error;
pub mod report;

// Re-exports
pub use connector::{
    Connector, ConnectorContext, ConnectorLanguage, ContextState, RegistryCredentials,
    ReportIdentity, Secret, WorkUnit,
};
pub use error::DomainError;
pub use report::{CompletionReport, ResultRecord, StepStatus};
