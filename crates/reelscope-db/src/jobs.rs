//! Job lookups used by the scheduler and orchestrator.

use reelscope_core::JobContext;
use sqlx::PgPool;

use crate::DbError;

/// Returns up to `limit` active job ids, least recently processed first.
///
/// Jobs that have never had an analysis run sort ahead of all others; ties
/// break on `id` so the order is deterministic across cycles.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_eligible_jobs(pool: &PgPool, limit: i64) -> Result<Vec<i64>, DbError> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT j.id \
         FROM analysis_jobs j \
         LEFT JOIN ( \
             SELECT job_id, MAX(started_at) AS last_run_at \
             FROM analysis_runs \
             GROUP BY job_id \
         ) r ON r.job_id = j.id \
         WHERE j.status = 'active' \
         ORDER BY r.last_run_at ASC NULLS FIRST, j.id ASC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

/// Loads the brand framing for a job.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the job does not exist, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_job_context(pool: &PgPool, job_id: i64) -> Result<JobContext, DbError> {
    let (brand_name, niche) = sqlx::query_as::<_, (Option<String>, Option<String>)>(
        "SELECT brand_name, niche FROM analysis_jobs WHERE id = $1",
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(JobContext { brand_name, niche })
}
