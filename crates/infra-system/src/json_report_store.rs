// JSON file report store
// Writes `{root}/{report_output_prefix}/{filename}.json`
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::info;

use connectors_ci_core::domain::CompletionReport;
use connectors_ci_core::error::{AppError, Result};
use connectors_ci_core::port::ReportStore;

pub struct JsonFileReportStore {
    root: PathBuf,
}

impl JsonFileReportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of a report with the given prefix and file stem
    pub fn path_for(&self, report_output_prefix: &str, filename: &str) -> Result<PathBuf> {
        let prefix = Path::new(report_output_prefix);
        let escapes_root = prefix
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes_root {
            return Err(AppError::Persistence(format!(
                "report prefix must be a relative path inside the report root: {}",
                report_output_prefix
            )));
        }
        Ok(self.root.join(prefix).join(format!("{}.json", filename)))
    }

    /// Read a report back
    pub async fn load(&self, report_output_prefix: &str, filename: &str) -> Result<CompletionReport> {
        let path = self.path_for(report_output_prefix, filename)?;
        let bytes = tokio::fs::read(&path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl ReportStore for JsonFileReportStore {
    async fn save(&self, report: &CompletionReport) -> Result<()> {
        let path = self.path_for(&report.identity().report_output_prefix, report.filename())?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec_pretty(report)?;
        tokio::fs::write(&path, body).await?;

        info!(path = %path.display(), report = %report.name(), "Report written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use connectors_ci_core::domain::{
        ConnectorLanguage, ContextState, ReportIdentity, ResultRecord, StepStatus,
    };
    use tokio_test::{assert_err, assert_ok};

    fn report(prefix: &str) -> CompletionReport {
        CompletionReport::new(
            format!("Report upload {}", prefix),
            ReportIdentity::new(prefix, Utc::now()),
            "complete",
            vec![ResultRecord {
                connector: "source-faker".to_string(),
                language: ConnectorLanguage::Python,
                final_state: ContextState::Successful,
                status: StepStatus::Success,
            }],
        )
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileReportStore::new(dir.path());
        let report = report("nightly/20240301");

        assert_ok!(store.save(&report).await);

        let path = dir.path().join("nightly/20240301/complete.json");
        assert!(path.exists());
        let loaded = store.load("nightly/20240301", "complete").await.unwrap();
        assert_eq!(loaded, report);
    }

    #[tokio::test]
    async fn test_prefix_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileReportStore::new(dir.path());

        assert_err!(store.save(&report("../outside")).await);
        assert_err!(store.save(&report("/abs/path")).await);
    }
}
