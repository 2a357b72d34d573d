//! Database operations for the `analysis_runs` ledger.
//!
//! A run is inserted in `running` status at the start of a pass and moved to
//! a terminal status exactly once. Rows are never deleted or re-opened.

use chrono::{DateTime, Utc};
use reelscope_core::{AnalysisSettings, RunStatus, ScopeCounters, SkipReason};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{to_i32, DbError};

const RUN_COLUMNS: &str = "id, public_id, job_id, status, config, scope_snapshot, \
                           attempted, succeeded, failed, skip_reason, diagnostics, \
                           started_at, completed_at";

/// A row from the `analysis_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AnalysisRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub job_id: i64,
    pub status: String,
    pub config: serde_json::Value,
    pub scope_snapshot: serde_json::Value,
    pub attempted: i32,
    pub succeeded: i32,
    pub failed: i32,
    pub skip_reason: Option<String>,
    pub diagnostics: Option<serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AnalysisRunRow {
    /// Parses the stored status string.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidData`] for a status outside the known set.
    pub fn run_status(&self) -> Result<RunStatus, DbError> {
        self.status
            .parse()
            .map_err(|e: reelscope_core::CoreError| DbError::InvalidData(e.to_string()))
    }
}

/// Terminal values written to a run when its pass ends.
#[derive(Debug, Clone, PartialEq)]
pub struct RunFinalization {
    pub status: RunStatus,
    pub scope_snapshot: ScopeCounters,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skip_reason: Option<SkipReason>,
    pub diagnostics: Option<serde_json::Value>,
}

/// Filter for the run-history query. `None` fields are unconstrained.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunHistoryFilter {
    pub job_id: Option<i64>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: i64,
}

fn to_json<T: serde::Serialize>(value: &T, field: &str) -> Result<serde_json::Value, DbError> {
    serde_json::to_value(value)
        .map_err(|e| DbError::InvalidData(format!("cannot serialize {field}: {e}")))
}

/// Inserts a new run in `running` status and returns the full row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_analysis_run(
    pool: &PgPool,
    job_id: i64,
    config: &AnalysisSettings,
    scope_snapshot: &ScopeCounters,
) -> Result<AnalysisRunRow, DbError> {
    let public_id = Uuid::new_v4();
    let config = to_json(config, "config")?;
    let scope_snapshot = to_json(scope_snapshot, "scope_snapshot")?;

    let row = sqlx::query_as::<_, AnalysisRunRow>(&format!(
        "INSERT INTO analysis_runs (public_id, job_id, status, config, scope_snapshot) \
         VALUES ($1, $2, 'running', $3, $4) \
         RETURNING {RUN_COLUMNS}"
    ))
    .bind(public_id)
    .bind(job_id)
    .bind(config)
    .bind(scope_snapshot)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Moves a `running` run to its terminal status and sets `completed_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::InvalidData`] if `finalization.status` is `running`,
/// [`DbError::InvalidRunTransition`] if the row is missing or already
/// terminal, or [`DbError::Sqlx`] if the update fails.
pub async fn finalize_analysis_run(
    pool: &PgPool,
    id: i64,
    finalization: &RunFinalization,
) -> Result<(), DbError> {
    if !finalization.status.is_terminal() {
        return Err(DbError::InvalidData(
            "cannot finalize a run into 'running'".to_string(),
        ));
    }

    let scope_snapshot = to_json(&finalization.scope_snapshot, "scope_snapshot")?;

    let result = sqlx::query(
        "UPDATE analysis_runs \
         SET status = $1, scope_snapshot = $2, attempted = $3, succeeded = $4, failed = $5, \
             skip_reason = $6, diagnostics = $7, completed_at = NOW() \
         WHERE id = $8 AND status = 'running'",
    )
    .bind(finalization.status.as_str())
    .bind(scope_snapshot)
    .bind(to_i32(finalization.attempted, "attempted")?)
    .bind(to_i32(finalization.succeeded, "succeeded")?)
    .bind(to_i32(finalization.failed, "failed")?)
    .bind(finalization.skip_reason.map(SkipReason::code))
    .bind(&finalization.diagnostics)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Fetches a single run by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_analysis_run(pool: &PgPool, id: i64) -> Result<AnalysisRunRow, DbError> {
    let row = sqlx::query_as::<_, AnalysisRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM analysis_runs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Returns runs matching `filter`, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_analysis_runs(
    pool: &PgPool,
    filter: &RunHistoryFilter,
) -> Result<Vec<AnalysisRunRow>, DbError> {
    let rows = sqlx::query_as::<_, AnalysisRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM analysis_runs \
         WHERE ($1::BIGINT IS NULL OR job_id = $1) \
           AND ($2::TIMESTAMPTZ IS NULL OR started_at >= $2) \
           AND ($3::TIMESTAMPTZ IS NULL OR started_at < $3) \
         ORDER BY started_at DESC, id DESC \
         LIMIT $4"
    ))
    .bind(filter.job_id)
    .bind(filter.since)
    .bind(filter.until)
    .bind(filter.limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
