use axum::{extract::State, Extension, Json};
use reelscope_core::SchedulerSettings;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;
use crate::scheduler::{SchedulerStatus, TickOutcome};

use super::{map_scheduler_error, ApiError, ApiResponse, AppState};

/// Body for `POST /api/v1/scheduler/start`. Omitted fields keep the value the
/// scheduler currently holds.
#[derive(Debug, Default, Deserialize)]
pub(super) struct StartRequest {
    pub enabled: Option<bool>,
    pub interval_minutes: Option<u64>,
    pub max_jobs_per_cycle: Option<usize>,
}

impl StartRequest {
    fn merge_onto(&self, current: SchedulerSettings) -> SchedulerSettings {
        SchedulerSettings {
            enabled: self.enabled.unwrap_or(current.enabled),
            interval_minutes: self.interval_minutes.unwrap_or(current.interval_minutes),
            max_jobs_per_cycle: self.max_jobs_per_cycle.unwrap_or(current.max_jobs_per_cycle),
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct TriggerData {
    outcome: TickOutcome,
}

fn settings_of(status: &SchedulerStatus) -> SchedulerSettings {
    SchedulerSettings {
        enabled: status.enabled,
        interval_minutes: status.interval_minutes,
        max_jobs_per_cycle: status.max_jobs_per_cycle,
    }
}

pub(super) async fn get_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<SchedulerStatus>>, ApiError> {
    let status = state
        .scheduler
        .status()
        .await
        .map_err(|e| map_scheduler_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(status, req_id.0)))
}

pub(super) async fn start(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    body: Option<Json<StartRequest>>,
) -> Result<Json<ApiResponse<SchedulerStatus>>, ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    if request.interval_minutes == Some(0) {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "interval_minutes must be at least 1",
        ));
    }

    let current = state
        .scheduler
        .status()
        .await
        .map_or(state.scheduler_defaults, |s| settings_of(&s));
    let settings = request.merge_onto(current);

    let status = state
        .scheduler
        .start(settings)
        .await
        .map_err(|e| map_scheduler_error(req_id.0.clone(), &e))?;
    tracing::info!(
        enabled = status.enabled,
        interval_minutes = status.interval_minutes,
        "api: scheduler started"
    );
    Ok(Json(ApiResponse::new(status, req_id.0)))
}

pub(super) async fn stop(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<SchedulerStatus>>, ApiError> {
    let status = state
        .scheduler
        .stop()
        .await
        .map_err(|e| map_scheduler_error(req_id.0.clone(), &e))?;
    tracing::info!("api: scheduler stopped");
    Ok(Json(ApiResponse::new(status, req_id.0)))
}

pub(super) async fn trigger(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<TriggerData>>, ApiError> {
    let outcome = state
        .scheduler
        .trigger()
        .await
        .map_err(|e| map_scheduler_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(TriggerData { outcome }, req_id.0)))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use reelscope_core::{QualifiedPool, SchedulerSettings};

    use super::StartRequest;
    use crate::api::test_support::{app_with, lazy_pool, open_auth, send};

    #[test]
    fn start_request_keeps_current_values_for_omitted_fields() {
        let current = SchedulerSettings {
            enabled: true,
            interval_minutes: 15,
            max_jobs_per_cycle: 3,
        };
        let request = StartRequest {
            interval_minutes: Some(45),
            ..StartRequest::default()
        };
        let merged = request.merge_onto(current);
        assert_eq!(merged.interval_minutes, 45);
        assert_eq!(merged.max_jobs_per_cycle, 3);
        assert!(merged.enabled);
    }

    #[tokio::test]
    async fn status_reports_stopped_scheduler() {
        let app = app_with(lazy_pool(), QualifiedPool::default(), open_auth());
        let (status, body) = send(app, "GET", "/api/v1/scheduler", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["running"], false);
        assert_eq!(body["data"]["cycles_started"], 0);
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let app = app_with(lazy_pool(), QualifiedPool::default(), open_auth());
        let (status, body) = send(
            app,
            "POST",
            "/api/v1/scheduler/start",
            Some(serde_json::json!({ "interval_minutes": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_error");
    }

    #[tokio::test]
    async fn start_with_disabled_schedules_nothing() {
        let app = app_with(lazy_pool(), QualifiedPool::default(), open_auth());
        let (status, body) = send(
            app,
            "POST",
            "/api/v1/scheduler/start",
            Some(serde_json::json!({ "enabled": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["enabled"], false);
        assert_eq!(body["data"]["running"], false);
    }

    #[tokio::test]
    async fn trigger_reports_tick_outcome() {
        let app = app_with(lazy_pool(), QualifiedPool::default(), open_auth());
        let (status, body) = send(app, "POST", "/api/v1/scheduler/trigger", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["outcome"], "started");
    }
}
