//! Sync trigger API handlers
//!
//! POST /sync/start, GET /sync/status/{job_id}, POST /sync/cancel/{job_id},
//! GET /sync/jobs, GET /sync/sources/{name}/test

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{SourceKind, SyncJob, SyncScope, SyncStatus};
use crate::AppState;

const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 500;

/// POST /sync/start request
#[derive(Debug, Deserialize)]
pub struct StartSyncRequest {
    pub scope: String,
}

/// POST /sync/start response
#[derive(Debug, Serialize)]
pub struct StartSyncResponse {
    pub job_id: Uuid,
    pub status: SyncStatus,
    pub started_at: DateTime<Utc>,
}

/// POST /sync/cancel response
#[derive(Debug, Serialize)]
pub struct CancelSyncResponse {
    pub job_id: Uuid,
    pub cancel_requested: bool,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// GET /sync/sources/{name}/test response
#[derive(Debug, Serialize)]
pub struct SourceTestResponse {
    pub source: SourceKind,
    pub ok: bool,
}

/// POST /sync/start
///
/// Starts a run in the background. Returns 202 with the job id.
pub async fn start_sync(
    State(state): State<AppState>,
    Json(request): Json<StartSyncRequest>,
) -> ApiResult<(StatusCode, Json<StartSyncResponse>)> {
    let scope: SyncScope = request.scope.parse().map_err(ApiError::BadRequest)?;

    let job = state.service.start(scope).await?;
    tracing::info!(job_id = %job.id, scope = %job.scope, "Sync job accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(StartSyncResponse {
            job_id: job.id,
            status: job.status,
            started_at: job.started_at,
        }),
    ))
}

/// GET /sync/status/{job_id}
pub async fn get_sync_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<SyncJob>> {
    let job = state.service.status(job_id).await?;
    tracing::debug!(job_id = %job_id, status = job.status.as_str(), "Status query");
    Ok(Json(job))
}

/// POST /sync/cancel/{job_id}
///
/// Signals the run; the job turns terminal once the engine observes it.
pub async fn cancel_sync(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<CancelSyncResponse>)> {
    state.service.cancel(job_id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CancelSyncResponse {
            job_id,
            cancel_requested: true,
        }),
    ))
}

/// GET /sync/jobs?limit=N
pub async fn list_sync_jobs(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<SyncJob>>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
    Ok(Json(state.service.history(limit).await?))
}

/// GET /sync/sources/{name}/test
pub async fn test_source(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<SourceTestResponse>> {
    let kind: SourceKind = name.parse().map_err(ApiError::NotFound)?;

    state.service.test_source(kind).await?;
    tracing::info!(source = %kind, "Source connection test passed");

    Ok(Json(SourceTestResponse { source: kind, ok: true }))
}

/// Build sync routes
pub fn sync_routes() -> Router<AppState> {
    Router::new()
        .route("/sync/start", post(start_sync))
        .route("/sync/status/:job_id", get(get_sync_status))
        .route("/sync/cancel/:job_id", post(cancel_sync))
        .route("/sync/jobs", get(list_sync_jobs))
        .route("/sync/sources/:name/test", get(test_source))
}
