//! Manual analysis and backfill handlers.
//!
//! Both build the same Postgres + HTTP orchestrator the server uses, so a
//! pass started here is recorded in the run ledger like a scheduled one.

use std::fmt::Write as _;

use reelscope_analysis::{BackfillReport, PassOutcome};
use reelscope_core::{AnalysisSettings, AppConfig, BackfillSettings, JobId};

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct BackfillOverrides {
    pub limit: Option<usize>,
    pub max_cycles: Option<u32>,
    pub target_coverage: Option<f64>,
}

pub(crate) fn pass_settings(
    defaults: AnalysisSettings,
    limit: Option<usize>,
    allow_degraded: bool,
) -> AnalysisSettings {
    AnalysisSettings {
        limit: limit.unwrap_or(defaults.limit),
        allow_degraded: allow_degraded || defaults.allow_degraded,
        ..defaults
    }
    .clamped()
}

pub(crate) fn backfill_settings(
    defaults: BackfillSettings,
    overrides: BackfillOverrides,
) -> BackfillSettings {
    BackfillSettings {
        max_cycles: overrides.max_cycles.unwrap_or(defaults.max_cycles),
        target_coverage: overrides
            .target_coverage
            .unwrap_or(defaults.target_coverage),
    }
    .clamped()
}

async fn ensure_job(pool: &sqlx::PgPool, job_id: JobId) -> anyhow::Result<()> {
    match reelscope_db::get_job_context(pool, job_id).await {
        Ok(_) => Ok(()),
        Err(reelscope_db::DbError::NotFound) => anyhow::bail!("job {job_id} not found"),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn format_outcome(outcome: &PassOutcome) -> String {
    let run = outcome
        .run_id
        .map_or_else(|| "-".to_string(), |id| id.to_string());
    let mut line = format!(
        "job {} run {}: {} attempted={} succeeded={} failed={} remaining={} coverage={:.0}%",
        outcome.job_id,
        run,
        outcome.status,
        outcome.attempted,
        outcome.succeeded,
        outcome.failed,
        outcome.remaining,
        outcome.coverage() * 100.0
    );
    if let Some(reason) = outcome.skip_reason {
        let _ = write!(line, " skip_reason={reason}");
    }
    line
}

/// Run a single orchestration pass for `job_id` and print its outcome.
///
/// # Errors
///
/// Returns an error if the job does not exist, the collaborator clients
/// cannot be built, or the pass fails during setup.
pub(crate) async fn run_analyze(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    job_id: JobId,
    limit: Option<usize>,
    allow_degraded: bool,
    json: bool,
) -> anyhow::Result<()> {
    ensure_job(pool, job_id).await?;
    let orchestrator = reelscope_analysis::build_orchestrator(pool, config)?;
    let settings = pass_settings(config.analysis, limit, allow_degraded);

    let outcome = orchestrator.run_pass(job_id, settings).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", format_outcome(&outcome));
        for failure in &outcome.errors {
            println!("  asset {}: {}", failure.asset_id, failure.error);
        }
    }
    Ok(())
}

/// Run backfill for `job_id` and print a per-cycle summary.
///
/// # Errors
///
/// Returns an error if the job does not exist, the collaborator clients
/// cannot be built, or any pass fails during setup.
pub(crate) async fn run_backfill(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    job_id: JobId,
    overrides: BackfillOverrides,
    json: bool,
) -> anyhow::Result<()> {
    ensure_job(pool, job_id).await?;
    let orchestrator = reelscope_analysis::build_orchestrator(pool, config)?;
    let settings = pass_settings(config.analysis, overrides.limit, false);
    let backfill = backfill_settings(config.backfill, overrides);

    let report: BackfillReport =
        reelscope_analysis::run_backfill(&orchestrator, job_id, settings, backfill).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for (i, cycle) in report.cycles.iter().enumerate() {
        println!("cycle {}: {}", i + 1, format_outcome(cycle));
    }
    println!(
        "stopped: {:?} after {} cycle(s); succeeded={} failed={} coverage={:.0}%",
        report.stop,
        report.cycles.len(),
        report.total_succeeded,
        report.total_failed,
        report.final_coverage * 100.0
    );
    Ok(())
}
