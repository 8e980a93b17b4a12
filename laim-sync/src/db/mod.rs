//! Inventory Store and Job History Store
//!
//! The engine only sees the traits; SQLite implementations live alongside.

pub mod inventory;
pub mod jobs;
pub mod retry;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{InventoryItem, ItemId, MacAddress, NewInventoryItem, SyncJob, SyncedFields};

pub use inventory::SqliteInventoryStore;
pub use jobs::SqliteJobHistoryStore;
pub use retry::retry_on_lock;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Item {0} not found")]
    NotFound(ItemId),

    /// Unique serial/MAC among live items, or a frozen job row
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Stored value that no longer parses
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// SQLite reported lock contention
    pub fn is_locked(&self) -> bool {
        matches!(self, StoreError::Database(e) if e.to_string().contains("database is locked"))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::ConstraintViolation(db.message().to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

/// Inventory items, query-by-identity and sync upserts
///
/// Lookups only return non-deleted items.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get(&self, id: ItemId) -> Result<Option<InventoryItem>, StoreError>;

    async fn find_by_serial(&self, serial: &str) -> Result<Option<InventoryItem>, StoreError>;

    async fn find_by_mac(&self, mac: &MacAddress) -> Result<Option<InventoryItem>, StoreError>;

    /// Exact hostname and IP (a missing IP only matches a missing IP)
    async fn find_by_host_ip(
        &self,
        hostname: &str,
        ip_address: Option<&str>,
    ) -> Result<Option<InventoryItem>, StoreError>;

    async fn create(&self, item: NewInventoryItem) -> Result<InventoryItem, StoreError>;

    /// Apply sync-owned fields; `None` keeps the stored value
    async fn update(&self, id: ItemId, fields: &SyncedFields) -> Result<InventoryItem, StoreError>;
}

/// Persisted run records
#[async_trait]
pub trait JobHistoryStore: Send + Sync {
    /// Insert, or replace a running row; terminal rows are immutable
    async fn append(&self, job: &SyncJob) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<SyncJob>, StoreError>;

    /// Newest first
    async fn list(&self, limit: usize) -> Result<Vec<SyncJob>, StoreError>;
}
