//! Process-level audit logging
//!
//! Every unit of work (the whole pipeline and each per-table load) writes
//! append-only STARTED/COMPLETED/FAILED rows into the audit table. History
//! is reconstructed by process name and timestamp ordering; rows are never
//! updated in place.

use chrono::{DateTime, Utc};
use sqlx::{Connection, PgConnection};
use tracing::error;

use crate::config::AuditConfig;
use crate::sql;
use stageload_common::{EtlError, Result};

/// Process name covering the whole pipeline run.
pub const ETL_PROCESS: &str = "ETL_PROCESS";

/// Audit status of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Started,
    Completed,
    Failed,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Writes audit rows for named processes.
///
/// Every write is best-effort: a failing audit insert is reported on the
/// operational log stream and otherwise swallowed, and it runs in its own
/// transaction, so audit-store unavailability never blocks or rolls back
/// the caller's data load.
pub struct ProcessLogger {
    insert_sql: String,
}

impl ProcessLogger {
    pub fn new(config: &AuditConfig) -> Self {
        let insert_sql = format!(
            "INSERT INTO {} \
             (process_name, start_time, end_time, status, rows_processed, error_message) \
             VALUES ($1, $2, $3, $4, $5, $6)",
            sql::qualified(&config.schema, &config.table)
        );
        Self { insert_sql }
    }

    /// Record that `process` has started.
    pub async fn log_start(
        &self,
        conn: &mut PgConnection,
        process: &str,
        started_at: DateTime<Utc>,
    ) {
        self.write(conn, process, started_at, Utc::now(), ProcessStatus::Started, None, None)
            .await;
    }

    /// Record that `process` finished with the given status.
    #[allow(clippy::too_many_arguments)]
    pub async fn log_end(
        &self,
        conn: &mut PgConnection,
        process: &str,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        status: ProcessStatus,
        rows_processed: Option<i64>,
        error_message: Option<&str>,
    ) {
        self.write(conn, process, started_at, finished_at, status, rows_processed, error_message)
            .await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn write(
        &self,
        conn: &mut PgConnection,
        process: &str,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        status: ProcessStatus,
        rows_processed: Option<i64>,
        error_message: Option<&str>,
    ) {
        if let Err(err) = self
            .insert(conn, process, started_at, finished_at, status, rows_processed, error_message)
            .await
        {
            error!(process, status = %status, error = %err, "failed to write audit log entry");
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert(
        &self,
        conn: &mut PgConnection,
        process: &str,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        status: ProcessStatus,
        rows_processed: Option<i64>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let mut tx = conn
            .begin()
            .await
            .map_err(|err| EtlError::AuditLog(err.to_string()))?;

        sqlx::query(&self.insert_sql)
            .bind(process)
            .bind(started_at)
            .bind(finished_at)
            .bind(status.as_str())
            .bind(rows_processed)
            .bind(error_message)
            .execute(&mut *tx)
            .await
            .map_err(|err| EtlError::AuditLog(err.to_string()))?;

        tx.commit()
            .await
            .map_err(|err| EtlError::AuditLog(err.to_string()))?;

        Ok(())
    }
}
