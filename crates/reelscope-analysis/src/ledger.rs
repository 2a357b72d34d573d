//! Best-effort wrappers around [`RunLedger`].
//!
//! Ledger writes never abort a pass: each helper logs the error branch and
//! discards it.

use reelscope_core::{AnalysisSettings, JobId, ScopeCounters};
use reelscope_db::RunFinalization;

use crate::ports::RunLedger;

/// Opens a run, returning `None` if the ledger could not record it.
pub async fn create_run_best_effort(
    ledger: &dyn RunLedger,
    job_id: JobId,
    config: &AnalysisSettings,
    snapshot: &ScopeCounters,
) -> Option<i64> {
    match ledger.create_run(job_id, config, snapshot).await {
        Ok(run_id) => Some(run_id),
        Err(e) => {
            tracing::error!(job_id, error = %e, "ledger: failed to create analysis run");
            None
        }
    }
}

/// Finalizes `run_id` if one was opened, logging any secondary error.
pub async fn finalize_run_best_effort(
    ledger: &dyn RunLedger,
    job_id: JobId,
    run_id: Option<i64>,
    finalization: &RunFinalization,
) {
    let Some(run_id) = run_id else {
        tracing::debug!(
            job_id,
            status = finalization.status.as_str(),
            "ledger: no run id, skipping finalize"
        );
        return;
    };
    if let Err(e) = ledger.finalize_run(run_id, finalization).await {
        tracing::error!(
            job_id,
            run_id,
            status = finalization.status.as_str(),
            error = %e,
            "ledger: failed to finalize analysis run"
        );
    }
}
