//! Per-job orchestration pass.
//!
//! A pass opens a run, walks the readiness gates while loading the pool and
//! assets, analyzes a bounded window, and finalizes the run exactly once as
//! `complete`, `skipped` or `failed`. Only setup errors (pool fetch, store
//! reads before the loop) escape to the caller, and only after the run has
//! been finalized as `failed`.
//!
//! At most one pass per job runs at a time within a process. A request for a
//! job that is already being processed is refused with
//! [`AnalysisError::JobBusy`] before any run is opened.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use reelscope_core::{
    AnalysisContext, AnalysisSettings, AssetFailure, AssetId, JobId, PoolRequest, RunStatus,
    ScopeCounters, SkipReason,
};
use reelscope_db::RunFinalization;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::AnalysisError;
use crate::events::{EventLevel, JobEvent, CODE_COMPLETED, CODE_FAILED, CODE_SKIPPED};
use crate::execution::{execute_window, WorkItem};
use crate::ledger::{create_run_best_effort, finalize_run_best_effort};
use crate::ports::{AssetAnalyzer, EventEmitter, MediaStore, PoolProvider, RunLedger};
use crate::prioritize::{prioritize, PrioritizationParams};
use crate::readiness::{check_credential, check_pool, select_candidates};

/// The systems a pass talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub pool: Arc<dyn PoolProvider>,
    pub analyzer: Arc<dyn AssetAnalyzer>,
    pub store: Arc<dyn MediaStore>,
    pub ledger: Arc<dyn RunLedger>,
    pub events: Arc<dyn EventEmitter>,
}

/// Caller-facing result of one pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassOutcome {
    pub job_id: JobId,
    /// `None` when the ledger could not open a run.
    pub run_id: Option<i64>,
    pub status: RunStatus,
    pub skip_reason: Option<SkipReason>,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Ready assets among the prioritized selection.
    pub eligible: usize,
    /// Eligible assets that already had an analysis before this pass.
    pub analyzed_before: usize,
    /// Unanalyzed eligible assets left for a later pass.
    pub remaining: usize,
    pub counters: ScopeCounters,
    pub errors: Vec<AssetFailure>,
}

impl PassOutcome {
    #[must_use]
    pub fn skipped(&self) -> bool {
        self.status == RunStatus::Skipped
    }

    /// Fraction of eligible assets analyzed once this pass finished.
    #[must_use]
    pub fn coverage(&self) -> f64 {
        if self.eligible == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = (self.analyzed_before + self.succeeded) as f64 / self.eligible as f64;
        ratio.min(1.0)
    }
}

enum Plan {
    Skip {
        reason: SkipReason,
        eligible: usize,
        analyzed_before: usize,
    },
    Ready {
        window: Vec<WorkItem>,
        eligible: usize,
        analyzed_before: usize,
        remaining: usize,
    },
}

pub struct Orchestrator {
    collaborators: Collaborators,
    ai_credential_configured: bool,
    active_jobs: Mutex<HashSet<JobId>>,
}

/// Exclusive hold on one job's passes, released on drop.
pub(crate) struct JobClaim<'a> {
    active_jobs: &'a Mutex<HashSet<JobId>>,
    job_id: JobId,
}

impl Drop for JobClaim<'_> {
    fn drop(&mut self) {
        self.active_jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.job_id);
    }
}

impl Orchestrator {
    #[must_use]
    pub fn new(collaborators: Collaborators, ai_credential_configured: bool) -> Self {
        Self {
            collaborators,
            ai_credential_configured,
            active_jobs: Mutex::new(HashSet::new()),
        }
    }

    /// Marks `job_id` as being processed until the returned claim drops.
    pub(crate) fn claim(&self, job_id: JobId) -> Result<JobClaim<'_>, AnalysisError> {
        let mut active = self
            .active_jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !active.insert(job_id) {
            tracing::info!(job_id, "orchestrator: pass already running for job, refusing");
            return Err(AnalysisError::JobBusy(job_id));
        }
        Ok(JobClaim {
            active_jobs: &self.active_jobs,
            job_id,
        })
    }

    /// Runs one pass for `job_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::JobBusy`] without opening a run when another
    /// pass for the job is in flight. Any other error comes from setup; the
    /// run has already been finalized as `failed` and an `analysis_failed`
    /// event emitted.
    pub async fn run_pass(
        &self,
        job_id: JobId,
        settings: AnalysisSettings,
    ) -> Result<PassOutcome, AnalysisError> {
        let claim = self.claim(job_id)?;
        self.run_claimed_pass(&claim, settings).await
    }

    /// Runs one pass for the job held by `claim`.
    pub(crate) async fn run_claimed_pass(
        &self,
        claim: &JobClaim<'_>,
        settings: AnalysisSettings,
    ) -> Result<PassOutcome, AnalysisError> {
        let job_id = claim.job_id;
        let settings = settings.clamped();
        let ledger = self.collaborators.ledger.as_ref();
        let events = self.collaborators.events.as_ref();

        let mut counters = ScopeCounters::default();
        let mut trace = Map::new();
        let run_id = create_run_best_effort(ledger, job_id, &settings, &counters).await;

        tracing::info!(
            job_id,
            run_id,
            limit = settings.limit,
            max_assets = settings.max_eligible_assets,
            max_posts = settings.max_eligible_posts,
            "orchestrator: pass started"
        );

        let plan = match self.plan(job_id, &settings, &mut counters, &mut trace).await {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!(job_id, run_id, error = %e, "orchestrator: pass setup failed");
                trace.insert("error".to_string(), Value::String(e.to_string()));
                let finalization = RunFinalization {
                    status: RunStatus::Failed,
                    scope_snapshot: counters,
                    attempted: 0,
                    succeeded: 0,
                    failed: 0,
                    skip_reason: None,
                    diagnostics: Some(Value::Object(trace)),
                };
                finalize_run_best_effort(ledger, job_id, run_id, &finalization).await;
                events.emit(
                    JobEvent::new(
                        job_id,
                        CODE_FAILED,
                        EventLevel::Error,
                        format!("content analysis failed: {e}"),
                    )
                    .with_metadata(json!({ "runId": run_id, "error": e.to_string() })),
                );
                return Err(e);
            }
        };

        match plan {
            Plan::Skip {
                reason,
                eligible,
                analyzed_before,
            } => {
                tracing::info!(
                    job_id,
                    run_id,
                    reason = reason.code(),
                    "orchestrator: pass skipped"
                );
                let finalization = RunFinalization {
                    status: RunStatus::Skipped,
                    scope_snapshot: counters,
                    attempted: 0,
                    succeeded: 0,
                    failed: 0,
                    skip_reason: Some(reason),
                    diagnostics: Some(Value::Object(trace)),
                };
                finalize_run_best_effort(ledger, job_id, run_id, &finalization).await;
                events.emit(
                    JobEvent::new(
                        job_id,
                        CODE_SKIPPED,
                        EventLevel::Info,
                        format!("content analysis skipped: {reason}"),
                    )
                    .with_metrics(counters_json(&counters))
                    .with_metadata(json!({ "runId": run_id, "reason": reason.code() })),
                );
                Ok(PassOutcome {
                    job_id,
                    run_id,
                    status: RunStatus::Skipped,
                    skip_reason: Some(reason),
                    attempted: 0,
                    succeeded: 0,
                    failed: 0,
                    eligible,
                    analyzed_before,
                    remaining: 0,
                    counters,
                    errors: Vec::new(),
                })
            }
            Plan::Ready {
                window,
                eligible,
                analyzed_before,
                remaining,
            } => {
                let tally = execute_window(
                    self.collaborators.analyzer.as_ref(),
                    events,
                    job_id,
                    &window,
                )
                .await;

                let window_ids: Vec<AssetId> = window.iter().map(|w| w.asset.id).collect();
                match self.collaborators.store.count_analyzed(&window_ids).await {
                    Ok(n) => counters.analyzed_in_window = n,
                    Err(e) => tracing::warn!(
                        job_id,
                        run_id,
                        error = %e,
                        "orchestrator: window recount failed, keeping pre-pass count"
                    ),
                }

                trace.insert("errors".to_string(), json!(tally.failures));
                trace.insert("remaining".to_string(), json!(remaining));
                let finalization = RunFinalization {
                    status: RunStatus::Complete,
                    scope_snapshot: counters,
                    attempted: tally.attempted,
                    succeeded: tally.succeeded,
                    failed: tally.failed,
                    skip_reason: None,
                    diagnostics: Some(Value::Object(trace)),
                };
                finalize_run_best_effort(ledger, job_id, run_id, &finalization).await;

                tracing::info!(
                    job_id,
                    run_id,
                    attempted = tally.attempted,
                    succeeded = tally.succeeded,
                    failed = tally.failed,
                    remaining,
                    "orchestrator: pass complete"
                );
                events.emit(
                    JobEvent::new(
                        job_id,
                        CODE_COMPLETED,
                        EventLevel::Info,
                        format!(
                            "content analysis complete: {} of {} assets analyzed",
                            tally.succeeded, tally.attempted
                        ),
                    )
                    .with_metrics(json!({
                        "attempted": tally.attempted,
                        "succeeded": tally.succeeded,
                        "failed": tally.failed,
                        "remaining": remaining,
                        "scope": counters,
                    }))
                    .with_metadata(json!({ "runId": run_id })),
                );

                Ok(PassOutcome {
                    job_id,
                    run_id,
                    status: RunStatus::Complete,
                    skip_reason: None,
                    attempted: tally.attempted,
                    succeeded: tally.succeeded,
                    failed: tally.failed,
                    eligible,
                    analyzed_before,
                    remaining,
                    counters,
                    errors: tally.failures,
                })
            }
        }
    }

    /// Loads everything a pass needs, stopping at the first tripped gate.
    ///
    /// `counters` and `trace` are filled as data arrives so a skip or a
    /// failure records as much scope as was known at that point.
    async fn plan(
        &self,
        job_id: JobId,
        settings: &AnalysisSettings,
        counters: &mut ScopeCounters,
        trace: &mut Map<String, Value>,
    ) -> Result<Plan, AnalysisError> {
        let store = self.collaborators.store.as_ref();
        let skip = |reason| Plan::Skip {
            reason,
            eligible: 0,
            analyzed_before: 0,
        };

        if let Err(reason) = check_credential(self.ai_credential_configured) {
            return Ok(skip(reason));
        }

        // Scope reporting only; a failed count must not turn into a failed run.
        counters.downloaded_total = match store.count_downloaded(job_id).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(
                    job_id,
                    error = %e,
                    "orchestrator: downloaded count unavailable, recording 0"
                );
                0
            }
        };

        let request = PoolRequest {
            allow_degraded_snapshots: settings.allow_degraded,
            ..PoolRequest::default()
        };
        let pool = self
            .collaborators
            .pool
            .fetch_pool(job_id, &request)
            .await
            .map_err(AnalysisError::PoolFetch)?;

        counters.qualified_for_ai = to_i64(pool.distinct_asset_ids().len());
        trace.insert("pool".to_string(), json!(pool.summary));

        if let Err(reason) = check_pool(&pool) {
            return Ok(skip(reason));
        }

        let selection = prioritize(
            &pool.posts,
            &PrioritizationParams::new(settings.max_eligible_posts, settings.max_eligible_assets),
        );
        trace.insert("selection".to_string(), selection.summary());
        if selection.asset_ids.is_empty() {
            return Ok(skip(SkipReason::NoQualifiedMediaAssets));
        }

        let mut by_id: HashMap<AssetId, _> = store
            .load_assets(&selection.asset_ids)
            .await?
            .into_iter()
            .map(|a| (a.id, a))
            .collect();
        let selected: Vec<_> = selection
            .asset_ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect();

        let candidates = match select_candidates(&selected, settings.skip_already_analyzed) {
            Ok(candidates) => candidates,
            Err(reason) => {
                let ready = selected.iter().filter(|a| a.is_ready());
                return Ok(Plan::Skip {
                    reason,
                    eligible: ready.clone().count(),
                    analyzed_before: ready.filter(|a| a.has_analysis).count(),
                });
            }
        };

        let eligible = candidates.eligible.len();
        let analyzed_before = candidates.analyzed_count();
        let remaining = candidates.pending.len().saturating_sub(settings.limit);
        trace.insert(
            "candidates".to_string(),
            json!({
                "eligible": eligible,
                "analyzedBefore": analyzed_before,
                "pending": candidates.pending.len(),
            }),
        );

        let job = store.job_context(job_id).await?;
        let window: Vec<WorkItem> = candidates
            .pending
            .into_iter()
            .take(settings.limit)
            .map(|asset| {
                let context = AnalysisContext {
                    brand_name: job.brand_name.clone(),
                    niche: job.niche.clone(),
                    platform: selection.platform_for(asset.id).map(str::to_string),
                    source: asset.linkage.source(),
                };
                WorkItem { asset, context }
            })
            .collect();

        counters.analysis_window = to_i64(window.len());
        counters.analyzed_in_window = to_i64(window.iter().filter(|w| w.asset.has_analysis).count());

        Ok(Plan::Ready {
            window,
            eligible,
            analyzed_before,
            remaining,
        })
    }
}

fn counters_json(counters: &ScopeCounters) -> Value {
    serde_json::to_value(counters).unwrap_or(Value::Null)
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
