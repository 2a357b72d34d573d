//! Repeated passes for one job until its scope is covered.

use reelscope_core::{AnalysisSettings, BackfillSettings, JobId};
use serde::Serialize;

use crate::error::AnalysisError;
use crate::orchestrator::{Orchestrator, PassOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackfillStop {
    MaxCycles,
    Skipped,
    Exhausted,
    CoverageReached,
    NoProgress,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackfillReport {
    pub job_id: JobId,
    pub stop: BackfillStop,
    pub cycles: Vec<PassOutcome>,
    pub total_succeeded: usize,
    pub total_failed: usize,
    pub final_coverage: f64,
}

/// Runs passes for `job_id` until a stop condition holds.
///
/// The job stays claimed for the whole backfill, so scheduled or manual
/// passes for it are refused until the last cycle finishes.
///
/// # Errors
///
/// Returns [`AnalysisError::JobBusy`] when the job is already being
/// processed, otherwise the first setup error from a pass.
pub async fn run_backfill(
    orchestrator: &Orchestrator,
    job_id: JobId,
    analysis: AnalysisSettings,
    backfill: BackfillSettings,
) -> Result<BackfillReport, AnalysisError> {
    let backfill = backfill.clamped();
    let mut cycles = Vec::new();
    let mut stop = BackfillStop::MaxCycles;
    let claim = orchestrator.claim(job_id)?;

    for cycle in 1..=backfill.max_cycles {
        let outcome = orchestrator.run_claimed_pass(&claim, analysis).await?;
        let coverage = outcome.coverage();
        tracing::info!(
            job_id,
            cycle,
            status = outcome.status.as_str(),
            succeeded = outcome.succeeded,
            remaining = outcome.remaining,
            coverage,
            "backfill: cycle finished"
        );

        let next = if outcome.skipped() {
            Some(BackfillStop::Skipped)
        } else if outcome.remaining == 0 {
            Some(BackfillStop::Exhausted)
        } else if coverage >= backfill.target_coverage {
            Some(BackfillStop::CoverageReached)
        } else if outcome.succeeded == 0 {
            Some(BackfillStop::NoProgress)
        } else {
            None
        };
        cycles.push(outcome);

        if let Some(reason) = next {
            stop = reason;
            break;
        }
    }

    let total_succeeded = cycles.iter().map(|c| c.succeeded).sum();
    let total_failed = cycles.iter().map(|c| c.failed).sum();
    let final_coverage = cycles.last().map_or(0.0, PassOutcome::coverage);

    tracing::info!(
        job_id,
        cycles = cycles.len(),
        ?stop,
        total_succeeded,
        final_coverage,
        "backfill: finished"
    );

    Ok(BackfillReport {
        job_id,
        stop,
        cycles,
        total_succeeded,
        total_failed,
        final_coverage,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use reelscope_core::{AssetId, SkipReason};

    use super::*;
    use crate::fakes::{client_post, ready_asset, FakeAnalyzer, FakeLedger, FakePool, FakeStore, RecordingEvents};
    use crate::orchestrator::Collaborators;

    fn setup(n: AssetId, pre_analyzed: AssetId) -> (Orchestrator, Arc<FakeAnalyzer>) {
        let posts = (1..=n)
            .map(|i| client_post(&format!("p{i}"), 1_000 - i as u64, &[i]))
            .collect();
        let assets = (1..=n).map(|i| ready_asset(i, i <= pre_analyzed)).collect();
        let store = Arc::new(FakeStore::with_assets(assets));
        let analyzer = Arc::new(FakeAnalyzer::new(Arc::clone(&store)));
        let orchestrator = Orchestrator::new(
            Collaborators {
                pool: Arc::new(FakePool::with_posts(posts)),
                analyzer: analyzer.clone(),
                store,
                ledger: Arc::new(FakeLedger::default()),
                events: Arc::new(RecordingEvents::default()),
            },
            true,
        );
        (orchestrator, analyzer)
    }

    fn analysis(limit: usize) -> AnalysisSettings {
        AnalysisSettings {
            limit,
            ..AnalysisSettings::default()
        }
    }

    fn backfill(max_cycles: u32, target_coverage: f64) -> BackfillSettings {
        BackfillSettings {
            max_cycles,
            target_coverage,
        }
    }

    #[tokio::test]
    async fn drains_the_scope_until_nothing_remains() {
        let (orchestrator, _) = setup(25, 0);
        let report = run_backfill(&orchestrator, 1, analysis(10), backfill(10, 1.0))
            .await
            .expect("backfill");
        assert_eq!(report.stop, BackfillStop::Exhausted);
        assert_eq!(report.cycles.len(), 3);
        assert_eq!(report.total_succeeded, 25);
        assert!((report.final_coverage - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn stops_at_max_cycles() {
        let (orchestrator, _) = setup(25, 0);
        let report = run_backfill(&orchestrator, 1, analysis(5), backfill(2, 1.0))
            .await
            .expect("backfill");
        assert_eq!(report.stop, BackfillStop::MaxCycles);
        assert_eq!(report.cycles.len(), 2);
        assert_eq!(report.total_succeeded, 10);
    }

    #[tokio::test]
    async fn stops_once_coverage_target_is_met() {
        let (orchestrator, _) = setup(20, 10);
        let report = run_backfill(&orchestrator, 1, analysis(5), backfill(10, 0.7))
            .await
            .expect("backfill");
        // 10 + 5 = 15/20 after cycle 1.
        assert_eq!(report.stop, BackfillStop::CoverageReached);
        assert_eq!(report.cycles.len(), 1);
        assert!((report.final_coverage - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn stops_when_a_pass_is_skipped() {
        let (orchestrator, _) = setup(3, 3);
        let report = run_backfill(&orchestrator, 1, analysis(5), backfill(10, 1.0))
            .await
            .expect("backfill");
        assert_eq!(report.stop, BackfillStop::Skipped);
        assert_eq!(
            report.cycles[0].skip_reason,
            Some(SkipReason::NoUnanalyzedMedia)
        );
    }

    #[tokio::test]
    async fn stops_when_nothing_succeeds() {
        let (orchestrator, analyzer) = setup(10, 0);
        for id in 1..=10 {
            analyzer.fail_verdict(id);
        }
        let report = run_backfill(&orchestrator, 1, analysis(3), backfill(10, 1.0))
            .await
            .expect("backfill");
        assert_eq!(report.stop, BackfillStop::NoProgress);
        assert_eq!(report.cycles.len(), 1);
        assert_eq!(report.total_failed, 3);
    }

    #[tokio::test]
    async fn refuses_a_job_that_is_already_being_processed() {
        let (orchestrator, analyzer) = setup(5, 0);
        let held = orchestrator.claim(1).expect("claim");

        let result = run_backfill(&orchestrator, 1, analysis(5), backfill(3, 1.0)).await;
        assert!(matches!(result, Err(AnalysisError::JobBusy(1))));
        assert!(analyzer.calls().is_empty());

        drop(held);
        let report = run_backfill(&orchestrator, 1, analysis(5), backfill(3, 1.0))
            .await
            .expect("backfill after release");
        assert_eq!(report.total_succeeded, 5);
        assert!(orchestrator.claim(1).is_ok());
    }
}
