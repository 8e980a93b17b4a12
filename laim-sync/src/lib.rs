//! laim-sync: device reconciliation engine
//!
//! Pulls device inventories from Netdisco and LibreNMS, merges them into one
//! view per physical device and upserts the result into the local inventory
//! without touching operator-entered fields.
//!
//! Exposed as a library for integration testing; the binary hosts the HTTP
//! trigger surface and the interval trigger.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod sources;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use tower_http::trace::TraceLayer;

use crate::workflow::SyncService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: SyncService,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(service: SyncService) -> Self {
        Self {
            service,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::sync_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
