//! Identity matching against existing inventory
//!
//! Cascade, first match wins:
//! 1. serial number
//! 2. MAC address
//! 3. hostname + IP, only for records carrying neither serial nor MAC
//!
//! When the serial and the MAC point at two different items, the serial
//! match wins and the MAC is flagged so the upsert does not move it.

use tracing::warn;

use crate::db::{InventoryStore, StoreError};
use crate::models::{DeviceRecord, InventoryItem, ItemId};

/// Which cascade stage produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKey {
    Serial,
    Mac,
    /// Low-confidence fallback
    HostIp,
}

/// Deduplication result for one reconciled record
#[derive(Debug, Clone, PartialEq)]
pub enum DedupDecision {
    Create,
    Update {
        item: InventoryItem,
        matched_on: MatchKey,
        /// Another live item already owns the record's MAC
        mac_conflict: Option<ItemId>,
    },
}

/// Resolve a record against the store
pub async fn resolve(
    store: &dyn InventoryStore,
    record: &DeviceRecord,
) -> Result<DedupDecision, StoreError> {
    if let Some(serial) = record.serial_number.as_deref() {
        if let Some(item) = store.find_by_serial(serial).await? {
            let mac_conflict = match &record.mac_address {
                Some(mac) if item.mac_address.as_ref() != Some(mac) => store
                    .find_by_mac(mac)
                    .await?
                    .map(|other| other.id)
                    .filter(|other| *other != item.id),
                _ => None,
            };

            if let Some(other) = mac_conflict {
                warn!(
                    device = %record.label(),
                    serial_item = item.id,
                    mac_item = other,
                    "Serial and MAC match different items; keeping serial match"
                );
            }

            return Ok(DedupDecision::Update {
                item,
                matched_on: MatchKey::Serial,
                mac_conflict,
            });
        }
    }

    if let Some(mac) = &record.mac_address {
        if let Some(item) = store.find_by_mac(mac).await? {
            return Ok(DedupDecision::Update {
                item,
                matched_on: MatchKey::Mac,
                mac_conflict: None,
            });
        }
    }

    if !record.has_identity() {
        if let Some(item) = store
            .find_by_host_ip(record.display_name(), record.ip_address.as_deref())
            .await?
        {
            return Ok(DedupDecision::Update {
                item,
                matched_on: MatchKey::HostIp,
                mac_conflict: None,
            });
        }
    }

    Ok(DedupDecision::Create)
}
