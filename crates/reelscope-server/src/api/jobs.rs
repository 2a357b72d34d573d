use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use reelscope_analysis::{BackfillReport, PassOutcome};
use reelscope_core::{AnalysisSettings, BackfillSettings, JobId};
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{map_analysis_error, map_db_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Default, Deserialize)]
pub(super) struct PassQuery {
    pub limit: Option<usize>,
    pub allow_degraded: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct BackfillQuery {
    pub limit: Option<usize>,
    pub max_cycles: Option<u32>,
    pub target_coverage: Option<f64>,
}

fn pass_settings(
    defaults: AnalysisSettings,
    limit: Option<usize>,
    allow_degraded: Option<bool>,
) -> AnalysisSettings {
    AnalysisSettings {
        limit: limit.unwrap_or(defaults.limit),
        allow_degraded: allow_degraded.unwrap_or(defaults.allow_degraded),
        ..defaults
    }
    .clamped()
}

/// Rejects unknown jobs with 404 before any run is opened for them.
async fn ensure_job_exists(
    state: &AppState,
    job_id: JobId,
    req_id: &str,
) -> Result<(), ApiError> {
    reelscope_db::get_job_context(&state.pool, job_id)
        .await
        .map(|_| ())
        .map_err(|e| map_db_error(req_id.to_string(), &e))
}

pub(super) async fn run_pass(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(job_id): Path<JobId>,
    Query(query): Query<PassQuery>,
) -> Result<Json<ApiResponse<PassOutcome>>, ApiError> {
    ensure_job_exists(&state, job_id, &req_id.0).await?;

    let settings = pass_settings(state.analysis, query.limit, query.allow_degraded);
    tracing::info!(job_id, limit = settings.limit, "api: manual analysis pass requested");

    let outcome = state
        .orchestrator
        .run_pass(job_id, settings)
        .await
        .map_err(|e| map_analysis_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(outcome, req_id.0)))
}

pub(super) async fn run_backfill(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(job_id): Path<JobId>,
    Query(query): Query<BackfillQuery>,
) -> Result<Json<ApiResponse<BackfillReport>>, ApiError> {
    ensure_job_exists(&state, job_id, &req_id.0).await?;

    let settings = pass_settings(state.analysis, query.limit, None);
    let backfill = BackfillSettings {
        max_cycles: query.max_cycles.unwrap_or(state.backfill.max_cycles),
        target_coverage: query
            .target_coverage
            .unwrap_or(state.backfill.target_coverage),
    };
    tracing::info!(job_id, max_cycles = backfill.max_cycles, "api: backfill requested");

    let report = reelscope_analysis::run_backfill(&state.orchestrator, job_id, settings, backfill)
        .await
        .map_err(|e| map_analysis_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(report, req_id.0)))
}
