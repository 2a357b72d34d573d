use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use reelscope_db::{AnalysisRunRow, RunHistoryFilter};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct AnalysisRunsQuery {
    pub job_id: Option<i64>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct AnalysisRunItem {
    run_id: Uuid,
    job_id: i64,
    status: String,
    attempted: i32,
    succeeded: i32,
    failed: i32,
    skip_reason: Option<String>,
    config: serde_json::Value,
    scope_snapshot: serde_json::Value,
    diagnostics: Option<serde_json::Value>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<AnalysisRunRow> for AnalysisRunItem {
    fn from(row: AnalysisRunRow) -> Self {
        Self {
            run_id: row.public_id,
            job_id: row.job_id,
            status: row.status,
            attempted: row.attempted,
            succeeded: row.succeeded,
            failed: row.failed,
            skip_reason: row.skip_reason,
            config: row.config,
            scope_snapshot: row.scope_snapshot,
            diagnostics: row.diagnostics,
            started_at: row.started_at,
            completed_at: row.completed_at,
        }
    }
}

pub(super) async fn list_analysis_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<AnalysisRunsQuery>,
) -> Result<Json<ApiResponse<Vec<AnalysisRunItem>>>, ApiError> {
    if let (Some(since), Some(until)) = (query.since, query.until) {
        if since >= until {
            return Err(ApiError::new(
                req_id.0,
                "validation_error",
                "since must be earlier than until",
            ));
        }
    }

    let filter = RunHistoryFilter {
        job_id: query.job_id,
        since: query.since,
        until: query.until,
        limit: normalize_limit(query.limit),
    };
    let rows = reelscope_db::list_analysis_runs(&state.pool, &filter)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows.into_iter().map(AnalysisRunItem::from).collect();
    Ok(Json(ApiResponse::new(data, req_id.0)))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::Utc;
    use reelscope_core::QualifiedPool;
    use uuid::Uuid;

    use super::AnalysisRunItem;
    use crate::api::test_support::{app_with, lazy_pool, open_auth, send};

    #[test]
    fn analysis_run_item_is_serializable() {
        let item = AnalysisRunItem {
            run_id: Uuid::new_v4(),
            job_id: 7,
            status: "skipped".to_string(),
            attempted: 0,
            succeeded: 0,
            failed: 0,
            skip_reason: Some("no_unanalyzed_media".to_string()),
            config: serde_json::json!({ "limit": 10 }),
            scope_snapshot: serde_json::json!({ "readyAssets": 4 }),
            diagnostics: None,
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
        };

        let json = serde_json::to_string(&item).expect("serialize analysis run");
        assert!(json.contains("\"skip_reason\":\"no_unanalyzed_media\""));
        assert!(json.contains("\"job_id\":7"));
        assert!(json.contains("\"readyAssets\":4"));
    }

    #[tokio::test]
    async fn inverted_time_window_is_rejected_before_querying() {
        let app = app_with(lazy_pool(), QualifiedPool::default(), open_auth());
        let (status, body) = send(
            app,
            "GET",
            "/api/v1/analysis-runs?since=2025-03-02T00:00:00Z&until=2025-03-01T00:00:00Z",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_error");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn lists_runs_newest_first_for_a_job(pool: sqlx::PgPool) {
        let job_id: i64 = sqlx::query_scalar(
            "INSERT INTO analysis_jobs (public_id, name, brand_name) \
             VALUES (gen_random_uuid(), 'acme', 'Acme') RETURNING id",
        )
        .fetch_one(&pool)
        .await
        .expect("insert job");
        for status in ["complete", "skipped"] {
            sqlx::query(
                "INSERT INTO analysis_runs (public_id, job_id, status, config, scope_snapshot) \
                 VALUES (gen_random_uuid(), $1, $2, '{}'::jsonb, '{}'::jsonb)",
            )
            .bind(job_id)
            .bind(status)
            .execute(&pool)
            .await
            .expect("insert run");
        }

        let app = app_with(pool, QualifiedPool::default(), open_auth());
        let (status, body) = send(
            app,
            "GET",
            &format!("/api/v1/analysis-runs?job_id={job_id}&limit=5"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let runs = body["data"].as_array().expect("array");
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0]["status"], "skipped");
    }
}
