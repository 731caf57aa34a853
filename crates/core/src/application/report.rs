// Report Aggregator
// Builds the batch completion report and hands it to the store

use crate::application::classifier::classify_all;
use crate::application::constants::{COMPLETE_REPORT_FILENAME, COMPLETE_REPORT_NAME_PREFIX};
use crate::domain::{CompletionReport, WorkUnit};
use crate::error::Result;
use crate::port::ReportStore;
use std::sync::Arc;
use tracing::info;

pub struct ReportAggregator {
    store: Arc<dyn ReportStore>,
}

impl ReportAggregator {
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        Self { store }
    }

    /// Build the report for a finished batch.
    ///
    /// The first unit's identity is reused so the report sorts next to the
    /// per-connector reports of the same run. Returns `None` for an empty batch.
    pub fn build<W: WorkUnit>(units: &[W]) -> Result<Option<CompletionReport>> {
        let Some(first) = units.first() else {
            return Ok(None);
        };

        // Classify everything before building anything
        let results = classify_all(units)?;
        let identity = first.report_identity();
        let name = format!(
            "{} {}",
            COMPLETE_REPORT_NAME_PREFIX, identity.report_output_prefix
        );

        Ok(Some(CompletionReport::new(
            name,
            identity,
            COMPLETE_REPORT_FILENAME,
            results,
        )))
    }

    /// Build and persist the report. The store is not called for an empty batch.
    pub async fn publish<W: WorkUnit>(&self, units: &[W]) -> Result<Option<CompletionReport>> {
        let Some(report) = Self::build(units)? else {
            return Ok(None);
        };

        self.store.save(&report).await?;
        info!(
            report = %report.name(),
            successes = report.success_count(),
            failures = report.failure_count(),
            "Completion report saved"
        );
        Ok(Some(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Connector, ConnectorContext, ConnectorLanguage, ContextState, ReportIdentity, StepStatus,
    };
    use crate::port::report_store::mocks::InMemoryReportStore;
    use chrono::{TimeZone, Utc};

    fn units() -> Vec<ConnectorContext> {
        let first_ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let later_ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 5, 0).unwrap();
        let mut a = ConnectorContext::new(
            Connector::new("source-a", ConnectorLanguage::Python),
            ReportIdentity::new("nightly/1709294400", first_ts),
        );
        a.state = ContextState::Successful;
        let mut b = ConnectorContext::new(
            Connector::new("destination-b", ConnectorLanguage::Java),
            ReportIdentity::new("nightly/other", later_ts),
        );
        b.state = ContextState::Error;
        vec![a, b]
    }

    #[test]
    fn test_build_uses_first_identity() {
        let report = ReportAggregator::build(&units()).unwrap().unwrap();

        assert_eq!(report.name(), "Report upload nightly/1709294400");
        assert_eq!(report.identity().report_output_prefix, "nightly/1709294400");
        assert_eq!(report.filename(), "complete");
        assert_eq!(report.results().len(), 2);
        assert_eq!(report.results()[1].status, StepStatus::Failure);
        assert_eq!(report.success_count(), 1);
        assert!(!report.is_successful());
    }

    #[test]
    fn test_build_empty_is_none() {
        let empty: Vec<ConnectorContext> = Vec::new();
        assert!(ReportAggregator::build(&empty).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_publish_saves_once() {
        let store = Arc::new(InMemoryReportStore::new());
        let aggregator = ReportAggregator::new(store.clone());

        let report = aggregator.publish(&units()).await.unwrap();
        assert!(report.is_some());
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_publish_skips_store_on_bad_state() {
        let store = Arc::new(InMemoryReportStore::new());
        let aggregator = ReportAggregator::new(store.clone());

        let mut units = units();
        units[1].state = ContextState::Running;

        let err = aggregator.publish(&units).await.unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(store.save_count(), 0);
    }
}
