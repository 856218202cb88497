//! Job status persistence
//!
//! The orchestrator keeps live status in memory; every state change is also
//! written here so `status` works from a different process.

use crate::jobs::{FinalizedJob, JobStatus};
use crate::utils::retry_on_lock;
use chrono::{DateTime, Utc};
use qra_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

pub async fn save_job(pool: &SqlitePool, status: &JobStatus, max_wait_ms: u64) -> Result<()> {
    // Prepare all data before acquiring a connection
    let job_id = status.job_id.to_string();
    let result = status.result.as_ref().map(serde_json::to_string).transpose()?;
    let created_at = status.created_at.to_rfc3339();
    let updated_at = status.updated_at.to_rfc3339();
    let chunks_total = status.chunks_total as i64;
    let chunks_completed = status.chunks_completed as i64;

    retry_on_lock("save job", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                job_id, kind, container, state, progress_percent,
                chunks_total, chunks_completed, result, error, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(job_id) DO UPDATE SET
                state = excluded.state,
                progress_percent = excluded.progress_percent,
                chunks_completed = excluded.chunks_completed,
                result = excluded.result,
                error = excluded.error,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&job_id)
        .bind(status.kind.as_str())
        .bind(status.container)
        .bind(status.state.as_str())
        .bind(status.progress_percent)
        .bind(chunks_total)
        .bind(chunks_completed)
        .bind(&result)
        .bind(&status.error)
        .bind(&created_at)
        .bind(&updated_at)
        .execute(pool)
        .await?;

        Ok(())
    })
    .await
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("invalid timestamp {}: {}", value, e)))
}

pub async fn load_job(pool: &SqlitePool, job_id: Uuid) -> Result<Option<JobStatus>> {
    let row = sqlx::query(
        r#"
        SELECT job_id, kind, container, state, progress_percent, chunks_total,
               chunks_completed, result, error, created_at, updated_at
        FROM jobs
        WHERE job_id = ?
        "#,
    )
    .bind(job_id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let kind: String = row.get("kind");
    let state: String = row.get("state");
    let result: Option<String> = row.get("result");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Some(JobStatus {
        job_id,
        kind: kind.parse()?,
        container: row.get("container"),
        state: state.parse()?,
        progress_percent: row.get("progress_percent"),
        chunks_total: row.get::<i64, _>("chunks_total") as usize,
        chunks_completed: row.get::<i64, _>("chunks_completed") as usize,
        result: result
            .map(|json| serde_json::from_str::<FinalizedJob>(&json))
            .transpose()?,
        error: row.get("error"),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    }))
}
