//! SQLite Inventory Store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use super::{InventoryStore, StoreError};
use crate::models::{InventoryItem, ItemId, ItemType, MacAddress, NewInventoryItem, SourceTag, SyncedFields};

const ITEM_COLUMNS: &str = r#"
    id, hostname, serial_number, mac_address, ip_address, model, vendor,
    firmware_version, asset_tag, room_location, sub_location, notes, item_type,
    source, source_id, last_synced_at, is_deleted
"#;

/// Inventory Store over the `inventory_items` table
#[derive(Clone)]
pub struct SqliteInventoryStore {
    pool: SqlitePool,
}

impl SqliteInventoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(
        &self,
        clause: &str,
        binds: &[Option<&str>],
    ) -> Result<Option<InventoryItem>, StoreError> {
        let sql = format!(
            "SELECT {} FROM inventory_items WHERE is_deleted = 0 AND {} ORDER BY id LIMIT 1",
            ITEM_COLUMNS, clause
        );
        let mut query = sqlx::query(&sql);
        for value in binds {
            query = query.bind(*value);
        }

        query
            .fetch_optional(&self.pool)
            .await?
            .map(|row| item_from_row(&row))
            .transpose()
    }
}

#[async_trait]
impl InventoryStore for SqliteInventoryStore {
    async fn get(&self, id: ItemId) -> Result<Option<InventoryItem>, StoreError> {
        let sql = format!("SELECT {} FROM inventory_items WHERE id = ?", ITEM_COLUMNS);
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| item_from_row(&row))
            .transpose()
    }

    async fn find_by_serial(&self, serial: &str) -> Result<Option<InventoryItem>, StoreError> {
        self.fetch_one_where("serial_number = ?", &[Some(serial)]).await
    }

    async fn find_by_mac(&self, mac: &MacAddress) -> Result<Option<InventoryItem>, StoreError> {
        self.fetch_one_where("mac_address = ?", &[Some(mac.as_str())]).await
    }

    async fn find_by_host_ip(
        &self,
        hostname: &str,
        ip_address: Option<&str>,
    ) -> Result<Option<InventoryItem>, StoreError> {
        // `IS` so that NULL matches NULL
        self.fetch_one_where("hostname = ? AND ip_address IS ?", &[Some(hostname), ip_address])
            .await
    }

    async fn create(&self, item: NewInventoryItem) -> Result<InventoryItem, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO inventory_items (
                hostname, serial_number, mac_address, ip_address, model, vendor,
                firmware_version, item_type, source, source_id, last_synced_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.hostname)
        .bind(&item.serial_number)
        .bind(item.mac_address.as_ref().map(MacAddress::as_str))
        .bind(&item.ip_address)
        .bind(&item.model)
        .bind(&item.vendor)
        .bind(&item.firmware_version)
        .bind(item.item_type.map(|t| t.as_str()))
        .bind(item.source.as_str())
        .bind(&item.source_id)
        .bind(item.last_synced_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get(id).await?.ok_or(StoreError::NotFound(id))
    }

    async fn update(&self, id: ItemId, fields: &SyncedFields) -> Result<InventoryItem, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_items SET
                hostname = COALESCE(?, hostname),
                mac_address = COALESCE(?, mac_address),
                ip_address = COALESCE(?, ip_address),
                model = COALESCE(?, model),
                vendor = COALESCE(?, vendor),
                firmware_version = COALESCE(?, firmware_version),
                source = ?,
                source_id = COALESCE(?, source_id),
                last_synced_at = ?,
                item_type = COALESCE(item_type, ?),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND is_deleted = 0
            "#,
        )
        .bind(&fields.hostname)
        .bind(fields.mac_address.as_ref().map(MacAddress::as_str))
        .bind(&fields.ip_address)
        .bind(&fields.model)
        .bind(&fields.vendor)
        .bind(&fields.firmware_version)
        .bind(fields.source.as_str())
        .bind(&fields.source_id)
        .bind(fields.last_synced_at.to_rfc3339())
        .bind(fields.item_type.map(|t| t.as_str()))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }

        self.get(id).await?.ok_or(StoreError::NotFound(id))
    }
}

fn item_from_row(row: &SqliteRow) -> Result<InventoryItem, StoreError> {
    let id: ItemId = row.try_get("id")?;

    let mac_address = row
        .try_get::<Option<String>, _>("mac_address")?
        .map(|mac| {
            MacAddress::parse(&mac)
                .ok_or_else(|| StoreError::Corrupt(format!("item {}: invalid MAC {}", id, mac)))
        })
        .transpose()?;

    let item_type = row
        .try_get::<Option<String>, _>("item_type")?
        .map(|t| {
            t.parse::<ItemType>()
                .map_err(|e| StoreError::Corrupt(format!("item {}: {}", id, e)))
        })
        .transpose()?;

    let source: String = row.try_get("source")?;
    let source = source
        .parse::<SourceTag>()
        .map_err(|e| StoreError::Corrupt(format!("item {}: {}", id, e)))?;

    let last_synced_at = row
        .try_get::<Option<String>, _>("last_synced_at")?
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| StoreError::Corrupt(format!("item {}: last_synced_at: {}", id, e)))
        })
        .transpose()?;

    Ok(InventoryItem {
        id,
        hostname: row.try_get("hostname")?,
        serial_number: row.try_get("serial_number")?,
        mac_address,
        ip_address: row.try_get("ip_address")?,
        model: row.try_get("model")?,
        vendor: row.try_get("vendor")?,
        firmware_version: row.try_get("firmware_version")?,
        asset_tag: row.try_get("asset_tag")?,
        room_location: row.try_get("room_location")?,
        sub_location: row.try_get("sub_location")?,
        notes: row.try_get("notes")?,
        item_type,
        source,
        source_id: row.try_get("source_id")?,
        last_synced_at,
        is_deleted: row.try_get::<i64, _>("is_deleted")? != 0,
    })
}
