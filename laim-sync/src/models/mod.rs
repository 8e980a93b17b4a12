//! Data models for laim-sync
//!
//! - `device`: canonical device observations produced by normalization
//! - `inventory_item`: persisted inventory items and their write payloads
//! - `sync_job`: run records and the job state machine

pub mod device;
pub mod inventory_item;
pub mod sync_job;

pub use device::{DeviceRecord, MacAddress, SourceKind};
pub use inventory_item::{InventoryItem, ItemId, ItemType, NewInventoryItem, SourceTag, SyncedFields};
pub use sync_job::{
    AlreadyFinalized, RecordError, SourceOutcome, SourceReport, SyncCounters, SyncJob, SyncScope,
    SyncStatus,
};
