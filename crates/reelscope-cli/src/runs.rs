//! Read-only queries over the run ledger and job table.

use chrono::{DateTime, Utc};
use reelscope_db::{AnalysisRunRow, RunHistoryFilter};

pub(crate) fn fmt_time(time: Option<DateTime<Utc>>) -> String {
    time.map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string())
}

pub(crate) fn format_run_row(run: &AnalysisRunRow) -> String {
    format!(
        "{:<8}{:<8}{:<10}{:<18}{:<18}{:>4}/{:<4}{:>4}  {}",
        run.id,
        run.job_id,
        run.status,
        fmt_time(Some(run.started_at)),
        fmt_time(run.completed_at),
        run.succeeded,
        run.attempted,
        run.failed,
        run.skip_reason.as_deref().unwrap_or("")
    )
}

/// Print analysis run history, newest first.
///
/// # Errors
///
/// Returns an error if the time window is inverted or the query fails.
pub(crate) async fn run_history(
    pool: &sqlx::PgPool,
    job_id: Option<i64>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    limit: i64,
) -> anyhow::Result<()> {
    if let (Some(since), Some(until)) = (since, until) {
        if since >= until {
            anyhow::bail!("--since must be earlier than --until");
        }
    }

    let filter = RunHistoryFilter {
        job_id,
        since,
        until,
        limit: limit.clamp(1, 200),
    };
    let runs = reelscope_db::list_analysis_runs(pool, &filter).await?;

    if runs.is_empty() {
        println!("no analysis runs found");
        return Ok(());
    }

    println!(
        "{:<8}{:<8}{:<10}{:<18}{:<18}{:<10}{:>4}  SKIP",
        "RUN", "JOB", "STATUS", "STARTED", "COMPLETED", "OK/TRIED", "FAIL"
    );
    for run in &runs {
        println!("{}", format_run_row(run));
    }
    Ok(())
}

/// Print the jobs the scheduler would visit next, in visit order.
///
/// # Errors
///
/// Returns an error if the query fails.
pub(crate) async fn run_eligible_jobs(pool: &sqlx::PgPool, limit: usize) -> anyhow::Result<()> {
    let jobs = reelscope_db::list_eligible_jobs(pool, i64::try_from(limit)?).await?;
    if jobs.is_empty() {
        println!("no active jobs");
        return Ok(());
    }
    for job_id in jobs {
        println!("{job_id}");
    }
    Ok(())
}
