// Connectors CI Infrastructure - System Adapters
// Implements: SharedService, ConnectorPipeline, ReportStore

pub mod command_pipeline;
pub mod json_report_store;
pub mod process_service;

pub use command_pipeline::CommandPipeline;
pub use json_report_store::JsonFileReportStore;
pub use process_service::{ProcessService, ProcessServiceConfig};
