//! HTTP error mapping for laim-sync
//!
//! Every handler returns [`ApiResult`]; errors render as
//! `{"error": {"code": ..., "message": ...}}` with a matching status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db::StoreError;
use crate::sources::SourceError;
use crate::workflow::TriggerError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - a run is already active
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Source unreachable or refused credentials (502)
    #[error("Source error: {0}")]
    Upstream(#[from] SourceError),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<TriggerError> for ApiError {
    fn from(err: TriggerError) -> Self {
        match err {
            TriggerError::RunActive(_) => ApiError::Conflict(err.to_string()),
            TriggerError::NotConfigured(_) | TriggerError::AlreadyTerminal { .. } => {
                ApiError::BadRequest(err.to_string())
            }
            TriggerError::NotFound(_) => ApiError::NotFound(err.to_string()),
            TriggerError::Store(e) => ApiError::Store(e),
            TriggerError::Source(e) => ApiError::Upstream(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Upstream(ref err) => {
                let code = match err {
                    SourceError::Auth(_) => "SOURCE_AUTH_FAILED",
                    SourceError::NotConfigured(_) => "SOURCE_NOT_CONFIGURED",
                    _ => "SOURCE_ERROR",
                };
                (StatusCode::BAD_GATEWAY, code, err.to_string())
            }
            ApiError::Store(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORE_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
