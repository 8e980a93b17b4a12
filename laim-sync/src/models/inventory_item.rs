//! Persisted inventory items
//!
//! An item combines sync-owned fields (written by the upsert engine),
//! operator-owned fields (never written by a sync once set) and provenance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::device::{MacAddress, SourceKind};

/// Inventory item primary key
pub type ItemId = i64;

/// Hardware category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    Laptop,
    Desktop,
    #[serde(rename = "Smart TV")]
    SmartTv,
    Server,
    #[serde(rename = "WAP")]
    Wap,
    Firewall,
    Switch,
    Other,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Laptop => "Laptop",
            ItemType::Desktop => "Desktop",
            ItemType::SmartTv => "Smart TV",
            ItemType::Server => "Server",
            ItemType::Wap => "WAP",
            ItemType::Firewall => "Firewall",
            ItemType::Switch => "Switch",
            ItemType::Other => "Other",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "laptop" => Ok(ItemType::Laptop),
            "desktop" => Ok(ItemType::Desktop),
            "smart tv" | "smart_tv" | "smarttv" => Ok(ItemType::SmartTv),
            "server" => Ok(ItemType::Server),
            "wap" | "access point" => Ok(ItemType::Wap),
            // Routers were folded into Firewall
            "firewall" | "router" => Ok(ItemType::Firewall),
            "switch" => Ok(ItemType::Switch),
            "other" => Ok(ItemType::Other),
            other => Err(format!("unknown item type: {}", other)),
        }
    }
}

/// Provenance tag: who last wrote the sync-owned fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SourceTag {
    /// Entered by an operator
    Manual,
    /// Written from a single sync source
    Source(SourceKind),
    /// Written from a record merged across two or more sources
    Merged,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Manual => "manual",
            SourceTag::Source(kind) => kind.as_str(),
            SourceTag::Merged => "merged",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(SourceTag::Manual),
            "merged" => Ok(SourceTag::Merged),
            other => other.parse::<SourceKind>().map(SourceTag::Source),
        }
    }
}

impl TryFrom<String> for SourceTag {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SourceTag> for String {
    fn from(tag: SourceTag) -> Self {
        tag.as_str().to_string()
    }
}

/// Persisted inventory item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: ItemId,

    // Sync-owned
    pub hostname: String,
    pub serial_number: Option<String>,
    pub mac_address: Option<MacAddress>,
    pub ip_address: Option<String>,
    pub model: Option<String>,
    pub vendor: Option<String>,
    pub firmware_version: Option<String>,

    // Operator-owned
    pub asset_tag: Option<String>,
    pub room_location: Option<String>,
    pub sub_location: Option<String>,
    pub notes: Option<String>,
    pub item_type: Option<ItemType>,

    // Provenance
    pub source: SourceTag,
    pub source_id: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
}

/// Insert payload for a new item (operator fields start empty)
#[derive(Debug, Clone, PartialEq)]
pub struct NewInventoryItem {
    pub hostname: String,
    pub serial_number: Option<String>,
    pub mac_address: Option<MacAddress>,
    pub ip_address: Option<String>,
    pub model: Option<String>,
    pub vendor: Option<String>,
    pub firmware_version: Option<String>,
    pub item_type: Option<ItemType>,
    pub source: SourceTag,
    pub source_id: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Partial update restricted to sync-owned fields
///
/// `None` leaves the stored value unchanged. `item_type` is only applied to
/// items that have no type yet.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedFields {
    pub hostname: Option<String>,
    pub mac_address: Option<MacAddress>,
    pub ip_address: Option<String>,
    pub model: Option<String>,
    pub vendor: Option<String>,
    pub firmware_version: Option<String>,
    pub source: SourceTag,
    pub source_id: Option<String>,
    pub last_synced_at: DateTime<Utc>,
    pub item_type: Option<ItemType>,
}

impl SyncedFields {
    /// Whether applying this update changes anything other than `last_synced_at`
    pub fn changes(&self, item: &InventoryItem) -> bool {
        fn differs<T: PartialEq>(new: &Option<T>, old: &T) -> bool {
            new.as_ref().is_some_and(|n| n != old)
        }
        fn differs_opt<T: PartialEq>(new: &Option<T>, old: &Option<T>) -> bool {
            new.is_some() && new != old
        }

        differs(&self.hostname, &item.hostname)
            || differs_opt(&self.mac_address, &item.mac_address)
            || differs_opt(&self.ip_address, &item.ip_address)
            || differs_opt(&self.model, &item.model)
            || differs_opt(&self.vendor, &item.vendor)
            || differs_opt(&self.firmware_version, &item.firmware_version)
            || self.source != item.source
            || differs_opt(&self.source_id, &item.source_id)
            || (item.item_type.is_none() && self.item_type.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> InventoryItem {
        InventoryItem {
            id: 1,
            hostname: "sw1".into(),
            serial_number: Some("S1".into()),
            mac_address: None,
            ip_address: Some("10.0.0.1".into()),
            model: Some("C9300".into()),
            vendor: None,
            firmware_version: None,
            asset_tag: None,
            room_location: Some("Lab B".into()),
            sub_location: None,
            notes: None,
            item_type: Some(ItemType::Switch),
            source: SourceTag::Source(SourceKind::Librenms),
            source_id: Some("7".into()),
            last_synced_at: None,
            is_deleted: false,
        }
    }

    fn same_as(item: &InventoryItem) -> SyncedFields {
        SyncedFields {
            hostname: Some(item.hostname.clone()),
            mac_address: None,
            ip_address: item.ip_address.clone(),
            model: item.model.clone(),
            vendor: None,
            firmware_version: None,
            source: item.source,
            source_id: item.source_id.clone(),
            last_synced_at: Utc::now(),
            item_type: Some(ItemType::Other),
        }
    }

    #[test]
    fn test_identical_fields_are_not_a_change() {
        let item = item();
        assert!(!same_as(&item).changes(&item));
    }

    #[test]
    fn test_new_value_is_a_change() {
        let item = item();
        let mut fields = same_as(&item);
        fields.vendor = Some("Cisco".into());
        assert!(fields.changes(&item));
    }

    #[test]
    fn test_type_only_counts_when_item_has_none() {
        let mut item = item();
        let fields = same_as(&item);
        assert!(!fields.changes(&item));

        item.item_type = None;
        assert!(fields.changes(&item));
    }

    #[test]
    fn test_source_tag_strings() {
        assert_eq!(SourceTag::Merged.as_str(), "merged");
        assert_eq!("librenms".parse::<SourceTag>().unwrap(), SourceTag::Source(SourceKind::Librenms));
        assert_eq!("manual".parse::<SourceTag>().unwrap(), SourceTag::Manual);
    }

    #[test]
    fn test_item_type_aliases() {
        assert_eq!("Router".parse::<ItemType>().unwrap(), ItemType::Firewall);
        assert_eq!("smart tv".parse::<ItemType>().unwrap(), ItemType::SmartTv);
        assert_eq!(serde_json::to_string(&ItemType::Wap).unwrap(), "\"WAP\"");
    }
}
