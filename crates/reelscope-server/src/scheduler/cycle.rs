//! One scheduler cycle: pick eligible jobs and process them one at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use reelscope_analysis::{AnalysisError, Orchestrator};
use reelscope_core::{AnalysisSettings, JobId};
use sqlx::PgPool;

/// Supplies the jobs a cycle should visit.
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn eligible_jobs(&self, limit: usize) -> anyhow::Result<Vec<JobId>>;
}

/// Processes a single job. Errors and panics stay inside the job.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job_id: JobId) -> anyhow::Result<()>;
}

pub struct PgJobSource {
    pool: PgPool,
}

impl PgJobSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobSource for PgJobSource {
    async fn eligible_jobs(&self, limit: usize) -> anyhow::Result<Vec<JobId>> {
        let limit = i64::try_from(limit)?;
        Ok(reelscope_db::list_eligible_jobs(&self.pool, limit).await?)
    }
}

/// Runs one orchestration pass per job with fixed settings.
pub struct PassProcessor {
    orchestrator: Arc<Orchestrator>,
    settings: AnalysisSettings,
}

impl PassProcessor {
    pub fn new(orchestrator: Arc<Orchestrator>, settings: AnalysisSettings) -> Self {
        Self {
            orchestrator,
            settings,
        }
    }
}

#[async_trait]
impl JobProcessor for PassProcessor {
    async fn process(&self, job_id: JobId) -> anyhow::Result<()> {
        let outcome = match self.orchestrator.run_pass(job_id, self.settings).await {
            Ok(outcome) => outcome,
            Err(AnalysisError::JobBusy(_)) => {
                tracing::info!(
                    job_id,
                    "scheduler: job busy with a manual pass, leaving it for next cycle"
                );
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        tracing::info!(
            job_id,
            run_id = outcome.run_id,
            status = outcome.status.as_str(),
            skip_reason = outcome.skip_reason.map(|r| r.code()),
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            "scheduler: job pass finished"
        );
        Ok(())
    }
}

/// Clears the in-progress flag when the cycle ends, however it ends.
pub(super) struct CycleGuard(Arc<AtomicBool>);

impl CycleGuard {
    pub(super) fn new(flag: Arc<AtomicBool>) -> Self {
        Self(flag)
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub jobs: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Visits up to `max_jobs` eligible jobs strictly in sequence.
///
/// Each job runs in its own task so a panic is contained to that job; the
/// cycle awaits it before moving on.
pub async fn run_cycle(
    source: Arc<dyn JobSource>,
    processor: Arc<dyn JobProcessor>,
    max_jobs: usize,
) -> CycleReport {
    let jobs = match source.eligible_jobs(max_jobs).await {
        Ok(jobs) => jobs,
        Err(e) => {
            tracing::error!(error = %e, "scheduler: failed to load eligible jobs");
            return CycleReport::default();
        }
    };

    if jobs.is_empty() {
        tracing::info!("scheduler: no eligible jobs; skipping cycle");
        return CycleReport::default();
    }

    tracing::info!(count = jobs.len(), "scheduler: processing eligible jobs");

    let mut report = CycleReport {
        jobs: jobs.len(),
        ..CycleReport::default()
    };
    for job_id in jobs {
        let processor = Arc::clone(&processor);
        let result = tokio::spawn(async move { processor.process(job_id).await }).await;
        match result {
            Ok(Ok(())) => report.succeeded += 1,
            Ok(Err(e)) => {
                report.failed += 1;
                tracing::error!(job_id, error = %e, "scheduler: job failed");
            }
            Err(join_err) => {
                report.failed += 1;
                tracing::error!(job_id, error = %join_err, "scheduler: job panicked");
            }
        }
    }

    tracing::info!(
        jobs = report.jobs,
        succeeded = report.succeeded,
        failed = report.failed,
        "scheduler: cycle complete"
    );
    report
}
