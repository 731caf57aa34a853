// Report Store Port (Interface)

use crate::domain::CompletionReport;
use crate::error::Result;
use async_trait::async_trait;

/// Persistence interface for completion reports
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Persist a report. Called exactly once per non-empty batch.
    async fn save(&self, report: &CompletionReport) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::Mutex;

    /// Keeps saved reports in memory
    #[derive(Default)]
    pub struct InMemoryReportStore {
        reports: Mutex<Vec<CompletionReport>>,
        fail: bool,
    }

    impl InMemoryReportStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn reports(&self) -> Vec<CompletionReport> {
            self.reports.lock().unwrap().clone()
        }

        pub fn save_count(&self) -> usize {
            self.reports.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ReportStore for InMemoryReportStore {
        async fn save(&self, report: &CompletionReport) -> Result<()> {
            if self.fail {
                return Err(AppError::Persistence("mock store failure".to_string()));
            }
            self.reports.lock().unwrap().push(report.clone());
            Ok(())
        }
    }
}
