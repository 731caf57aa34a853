// Batch constants (no magic values)

/// Default number of connector pipelines allowed in flight
pub const DEFAULT_CONCURRENCY: usize = 5;

/// File stem of the completion report
pub const COMPLETE_REPORT_FILENAME: &str = "complete";

/// Prefix of the completion report's display name
pub const COMPLETE_REPORT_NAME_PREFIX: &str = "Report upload";

/// Separator between the batch name and a connector name in task labels
pub const PIPELINE_LABEL_SEPARATOR: &str = " - ";
