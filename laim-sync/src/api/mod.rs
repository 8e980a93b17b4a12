//! HTTP API handlers for laim-sync

pub mod health;
pub mod sync;

pub use health::health_routes;
pub use sync::sync_routes;
