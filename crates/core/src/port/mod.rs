// Port Layer - Interfaces for external dependencies

pub mod report_store;
pub mod shared_service;
pub mod time_provider;

// Re-exports
pub use report_store::ReportStore;
pub use shared_service::{
    LogDestination, ServiceError, ServiceHandle, ServiceOptions, SharedService,
};
pub use time_provider::TimeProvider;
