// SQLite ReportStore Implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use connectors_ci_core::domain::{CompletionReport, ReportIdentity, ResultRecord};
use connectors_ci_core::error::{AppError, Result};
use connectors_ci_core::port::{ReportStore, TimeProvider};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

// result_records is keyed by (report_id, position) and references its report
fn map_sqlx_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        // SQLite extended result codes: https://www.sqlite.org/rescode.html
        match db_err.code().as_deref() {
            Some("1555") => {
                return AppError::Persistence(format!(
                    "Duplicate result record: {}",
                    db_err.message()
                ))
            }
            Some("787") => {
                return AppError::Persistence(format!(
                    "Result record without report: {}",
                    db_err.message()
                ))
            }
            _ => {}
        }
    }
    AppError::Persistence(err.to_string())
}

// Enum columns are stored as their serde string form
fn to_column<T: Serialize>(value: &T) -> Result<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(AppError::Internal(format!(
            "Expected string column value, got {}",
            other
        ))),
    }
}

fn from_column<T: DeserializeOwned>(value: String) -> Result<T> {
    Ok(serde_json::from_value(serde_json::Value::String(value))?)
}

/// Stores completion reports in two tables: one row per report, one row
/// per result record keyed by its position in the batch.
pub struct SqliteReportStore {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteReportStore {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    /// All reports saved under a prefix, oldest first
    pub async fn find_by_prefix(&self, report_output_prefix: &str) -> Result<Vec<CompletionReport>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM completion_reports WHERE report_output_prefix = ? ORDER BY saved_at, rowid",
        )
        .bind(report_output_prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut reports = Vec::with_capacity(ids.len());
        for id in ids {
            reports.push(self.load(&id).await?);
        }
        Ok(reports)
    }

    /// Most recently saved report
    pub async fn latest(&self) -> Result<Option<CompletionReport>> {
        let id: Option<String> = sqlx::query_scalar(
            "SELECT id FROM completion_reports ORDER BY saved_at DESC, rowid DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match id {
            Some(id) => Ok(Some(self.load(&id).await?)),
            None => Ok(None),
        }
    }

    pub async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM completion_reports")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn load(&self, id: &str) -> Result<CompletionReport> {
        let row = sqlx::query(
            "SELECT name, report_output_prefix, created_at, filename FROM completion_reports WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let name: String = row.try_get("name").map_err(map_sqlx_error)?;
        let prefix: String = row.try_get("report_output_prefix").map_err(map_sqlx_error)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(map_sqlx_error)?;
        let filename: String = row.try_get("filename").map_err(map_sqlx_error)?;

        let rows = sqlx::query(
            "SELECT connector, language, final_state, status FROM result_records WHERE report_id = ? ORDER BY position",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            results.push(ResultRecord {
                connector: row.try_get("connector").map_err(map_sqlx_error)?,
                language: from_column(row.try_get("language").map_err(map_sqlx_error)?)?,
                final_state: from_column(row.try_get("final_state").map_err(map_sqlx_error)?)?,
                status: from_column(row.try_get("status").map_err(map_sqlx_error)?)?,
            });
        }

        Ok(CompletionReport::new(
            name,
            ReportIdentity::new(prefix, created_at),
            filename,
            results,
        ))
    }
}

#[async_trait]
impl ReportStore for SqliteReportStore {
    async fn save(&self, report: &CompletionReport) -> Result<()> {
        let id = Uuid::new_v4().to_string();
        let saved_at = self.time_provider.now_millis();

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO completion_reports (
                id, name, report_output_prefix, created_at, filename,
                success_count, failure_count, saved_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(report.name())
        .bind(&report.identity().report_output_prefix)
        .bind(report.identity().created_at)
        .bind(report.filename())
        .bind(report.success_count() as i64)
        .bind(report.failure_count() as i64)
        .bind(saved_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        for (position, record) in report.results().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO result_records (
                    report_id, position, connector, language, final_state, status
                ) VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(position as i64)
            .bind(&record.connector)
            .bind(to_column(&record.language)?)
            .bind(to_column(&record.final_state)?)
            .bind(to_column(&record.status)?)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        info!(
            report_id = %id,
            report = %report.name(),
            records = report.results().len(),
            "Report saved"
        );
        Ok(())
    }
}
