//! Inventory writes for reconciled records
//!
//! **Create:** new item carrying the record's sync-owned fields, its
//! provenance, and the classified type. Operator fields start empty. A record
//! without a reported hostname is stored under its IP, else its source id.
//!
//! **Update:** only sync-owned fields, only where the record has a value.
//! Operator fields are never written; `item_type` is filled in only when the
//! item has none. `last_synced_at` is always refreshed but does not count as
//! a change.
//!
//! Nothing is ever deleted.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::classifier::Classifier;
use super::deduplicator::DedupDecision;
use super::reconciler::ReconciledRecord;
use crate::db::{InventoryStore, StoreError};
use crate::models::{InventoryItem, NewInventoryItem, SyncedFields};

/// What a single write did
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Created(InventoryItem),
    /// At least one sync-owned field changed
    Updated(InventoryItem),
    /// Only `last_synced_at` was refreshed
    Unchanged(InventoryItem),
}

impl UpsertOutcome {
    pub fn item(&self) -> &InventoryItem {
        match self {
            UpsertOutcome::Created(item) | UpsertOutcome::Updated(item) | UpsertOutcome::Unchanged(item) => item,
        }
    }
}

/// Applies dedup decisions to the Inventory Store
pub struct UpsertEngine<'a> {
    store: &'a dyn InventoryStore,
    classifier: &'a Classifier,
}

impl<'a> UpsertEngine<'a> {
    pub fn new(store: &'a dyn InventoryStore, classifier: &'a Classifier) -> Self {
        Self { store, classifier }
    }

    /// Write one record
    pub async fn apply(
        &self,
        reconciled: &ReconciledRecord,
        decision: DedupDecision,
        synced_at: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StoreError> {
        match decision {
            DedupDecision::Create => self.create(reconciled, synced_at).await,
            DedupDecision::Update {
                item, mac_conflict, ..
            } => {
                let fields = self.synced_fields(reconciled, &item, mac_conflict.is_some(), synced_at);
                let changed = fields.changes(&item);
                let written = self.store.update(item.id, &fields).await?;

                debug!(item_id = written.id, changed, "Updated inventory item");
                Ok(if changed {
                    UpsertOutcome::Updated(written)
                } else {
                    UpsertOutcome::Unchanged(written)
                })
            }
        }
    }

    async fn create(
        &self,
        reconciled: &ReconciledRecord,
        synced_at: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StoreError> {
        let record = &reconciled.record;
        let item_type = self.classifier.classify(record);

        let created = self
            .store
            .create(NewInventoryItem {
                hostname: record.display_name().to_string(),
                serial_number: record.serial_number.clone(),
                mac_address: record.mac_address.clone(),
                ip_address: record.ip_address.clone(),
                model: record.model.clone(),
                vendor: record.vendor.clone(),
                firmware_version: record.firmware_version.clone(),
                item_type: Some(item_type),
                source: reconciled.tag,
                source_id: Some(record.source_id.clone()),
                last_synced_at: Some(synced_at),
            })
            .await?;

        debug!(item_id = created.id, item_type = %item_type, "Created inventory item");
        Ok(UpsertOutcome::Created(created))
    }

    fn synced_fields(
        &self,
        reconciled: &ReconciledRecord,
        item: &InventoryItem,
        skip_mac: bool,
        synced_at: DateTime<Utc>,
    ) -> SyncedFields {
        let record = &reconciled.record;
        SyncedFields {
            hostname: record.hostname.clone(),
            // The MAC belongs to a different item
            mac_address: if skip_mac { None } else { record.mac_address.clone() },
            ip_address: record.ip_address.clone(),
            model: record.model.clone(),
            vendor: record.vendor.clone(),
            firmware_version: record.firmware_version.clone(),
            source: reconciled.tag,
            source_id: Some(record.source_id.clone()),
            last_synced_at: synced_at,
            item_type: if item.item_type.is_none() {
                Some(self.classifier.classify(record))
            } else {
                None
            },
        }
    }
}
