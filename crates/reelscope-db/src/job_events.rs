//! Database operations for `job_events`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// An event to append to a job's timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJobEvent {
    pub job_id: i64,
    pub source: String,
    pub code: String,
    pub level: String,
    pub message: String,
    pub metrics: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
}

/// A row from the `job_events` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobEventRow {
    pub id: i64,
    pub job_id: i64,
    pub source: String,
    pub code: String,
    pub level: String,
    pub message: String,
    pub metrics: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Appends an event row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_job_event(pool: &PgPool, event: &NewJobEvent) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO job_events (job_id, source, code, level, message, metrics, metadata) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(event.job_id)
    .bind(&event.source)
    .bind(&event.code)
    .bind(&event.level)
    .bind(&event.message)
    .bind(&event.metrics)
    .bind(&event.metadata)
    .execute(pool)
    .await?;

    Ok(())
}

/// Returns a job's most recent `limit` events, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_job_events(
    pool: &PgPool,
    job_id: i64,
    limit: i64,
) -> Result<Vec<JobEventRow>, DbError> {
    let rows = sqlx::query_as::<_, JobEventRow>(
        "SELECT id, job_id, source, code, level, message, metrics, metadata, created_at \
         FROM job_events \
         WHERE job_id = $1 \
         ORDER BY created_at DESC, id DESC \
         LIMIT $2",
    )
    .bind(job_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
