//! SQLite Job History Store
//!
//! Per-source reports, totals and the error list are stored as JSON text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{retry_on_lock, JobHistoryStore, StoreError};
use crate::models::{RecordError, SourceKind, SourceReport, SyncCounters, SyncJob, SyncScope, SyncStatus};

/// Default lock wait for history writes
const MAX_LOCK_WAIT_MS: u64 = 5000;

/// Job History Store over the `sync_jobs` table
#[derive(Clone)]
pub struct SqliteJobHistoryStore {
    pool: SqlitePool,
}

impl SqliteJobHistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn to_json<T: serde::Serialize>(value: &T, what: &str) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Corrupt(format!("serialize {}: {}", what, e)))
}

#[async_trait]
impl JobHistoryStore for SqliteJobHistoryStore {
    async fn append(&self, job: &SyncJob) -> Result<(), StoreError> {
        // Prepare all data before touching the pool
        let job_id = job.id.to_string();
        let sources = to_json(&job.sources, "sources")?;
        let totals = to_json(&job.totals, "totals")?;
        let errors = to_json(&job.errors, "errors")?;
        let started_at = job.started_at.to_rfc3339();
        let finished_at = job.finished_at.map(|dt| dt.to_rfc3339());

        let rows = retry_on_lock("append sync job", MAX_LOCK_WAIT_MS, || async {
            let result = sqlx::query(
                r#"
                INSERT INTO sync_jobs (
                    job_id, scope, status, started_at, finished_at,
                    sources, totals, errors, cancelled
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(job_id) DO UPDATE SET
                    status = excluded.status,
                    finished_at = excluded.finished_at,
                    sources = excluded.sources,
                    totals = excluded.totals,
                    errors = excluded.errors,
                    cancelled = excluded.cancelled
                WHERE sync_jobs.status = 'running'
                "#,
            )
            .bind(&job_id)
            .bind(job.scope.as_str())
            .bind(job.status.as_str())
            .bind(&started_at)
            .bind(&finished_at)
            .bind(&sources)
            .bind(&totals)
            .bind(&errors)
            .bind(job.cancelled)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
            Ok::<u64, StoreError>(result.rows_affected())
        })
        .await?;

        if rows == 0 {
            return Err(StoreError::ConstraintViolation(format!(
                "job {} is already finalized",
                job.id
            )));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<SyncJob>, StoreError> {
        sqlx::query(
            r#"
            SELECT job_id, scope, status, started_at, finished_at, sources, totals, errors, cancelled
            FROM sync_jobs
            WHERE job_id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .map(|row| job_from_row(&row))
        .transpose()
    }

    async fn list(&self, limit: usize) -> Result<Vec<SyncJob>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT job_id, scope, status, started_at, finished_at, sources, totals, errors, cancelled
            FROM sync_jobs
            ORDER BY started_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect()
    }
}

fn job_from_row(row: &SqliteRow) -> Result<SyncJob, StoreError> {
    let corrupt = |field: &str, e: String| StoreError::Corrupt(format!("sync_jobs.{}: {}", field, e));

    let id: String = row.try_get("job_id")?;
    let id = Uuid::parse_str(&id).map_err(|e| corrupt("job_id", e.to_string()))?;

    let scope: String = row.try_get("scope")?;
    let scope: SyncScope = scope.parse().map_err(|e| corrupt("scope", e))?;

    let status: String = row.try_get("status")?;
    let status: SyncStatus = status.parse().map_err(|e| corrupt("status", e))?;

    let started_at: String = row.try_get("started_at")?;
    let started_at = DateTime::parse_from_rfc3339(&started_at)
        .map_err(|e| corrupt("started_at", e.to_string()))?
        .with_timezone(&Utc);

    let finished_at = row
        .try_get::<Option<String>, _>("finished_at")?
        .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
        .transpose()
        .map_err(|e| corrupt("finished_at", e.to_string()))?;

    let sources: String = row.try_get("sources")?;
    let sources: BTreeMap<SourceKind, SourceReport> =
        serde_json::from_str(&sources).map_err(|e| corrupt("sources", e.to_string()))?;

    let totals: String = row.try_get("totals")?;
    let totals: SyncCounters = serde_json::from_str(&totals).map_err(|e| corrupt("totals", e.to_string()))?;

    let errors: String = row.try_get("errors")?;
    let errors: Vec<RecordError> = serde_json::from_str(&errors).map_err(|e| corrupt("errors", e.to_string()))?;

    Ok(SyncJob {
        id,
        scope,
        status,
        started_at,
        finished_at,
        sources,
        totals,
        errors,
        cancelled: row.try_get("cancelled")?,
    })
}
