//! Source payload normalization
//!
//! Pure mapping from a source-native payload to a [`DeviceRecord`]:
//!
//! | Canonical field  | Netdisco       | LibreNMS                          |
//! |------------------|----------------|-----------------------------------|
//! | hostname         | dns, name      | hostname, sysName                 |
//! | serial_number    | serial         | serial                            |
//! | mac_address      | first node mac | first port ifPhysAddress          |
//! | ip_address       | ip             | ip                                |
//! | model            | model          | hardware                          |
//! | vendor           | vendor         | vendor, else parsed from hardware |
//! | firmware_version | os_ver         | version                           |
//! | source_id        | ip             | device_id                         |

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::models::{device::non_empty, DeviceRecord, MacAddress, SourceKind};
use crate::sources::{LibrenmsDevice, NetdiscoDevice, RawPayload};

/// Payload rejected by the normalizer; logged and counted, never fatal
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SkipRecord {
    #[error("{kind} payload has no source id")]
    MissingSourceId { kind: SourceKind },

    #[error("{kind} payload {source_id} has no hostname, IP, serial or MAC")]
    NoIdentity { kind: SourceKind, source_id: String },
}

/// Vendor names recognised in LibreNMS hardware strings, first match wins
const HARDWARE_VENDORS: &[(&str, &[&str])] = &[
    ("Cisco", &["cisco", "catalyst", "nexus", "asa", "meraki"]),
    ("Juniper", &["juniper", "junos", "srx", "ex-", "qfx"]),
    ("Aruba", &["aruba", "arubaos"]),
    ("HP", &["hp ", "hewlett", "procurve"]),
    ("Dell", &["dell", "force10", "powerconnect"]),
    ("Ubiquiti", &["ubiquiti", "unifi", "edgeswitch", "edgerouter"]),
    ("Fortinet", &["fortinet", "fortigate", "fortios"]),
    ("Palo Alto", &["palo alto", "pan-os"]),
    ("Arista", &["arista", "eos"]),
    ("MikroTik", &["mikrotik", "routeros"]),
    ("Netgear", &["netgear"]),
    ("TP-Link", &["tp-link", "tplink"]),
    ("VMware", &["vmware", "esxi"]),
    ("Linux", &["linux", "ubuntu", "centos", "debian", "rhel"]),
    ("Windows", &["windows", "microsoft"]),
];

/// Derive a vendor name from a free-text hardware description
pub fn vendor_from_hardware(hardware: &str) -> Option<&'static str> {
    let lower = hardware.to_lowercase();
    HARDWARE_VENDORS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(vendor, _)| *vendor)
}

/// Normalize one raw payload
pub fn normalize(payload: RawPayload, fetched_at: DateTime<Utc>) -> Result<DeviceRecord, SkipRecord> {
    match payload {
        RawPayload::Netdisco(device) => from_netdisco(device, fetched_at),
        RawPayload::Librenms(device) => from_librenms(device, fetched_at),
    }
}

/// Normalize a batch, splitting records from skips
pub fn normalize_all(
    payloads: Vec<RawPayload>,
    fetched_at: DateTime<Utc>,
) -> (Vec<DeviceRecord>, Vec<SkipRecord>) {
    let mut records = Vec::with_capacity(payloads.len());
    let mut skipped = Vec::new();

    for payload in payloads {
        match normalize(payload, fetched_at) {
            Ok(record) => records.push(record),
            Err(skip) => {
                debug!(reason = %skip, "Skipping record");
                skipped.push(skip);
            }
        }
    }

    (records, skipped)
}

fn from_netdisco(device: NetdiscoDevice, fetched_at: DateTime<Utc>) -> Result<DeviceRecord, SkipRecord> {
    let source = SourceKind::Netdisco;
    let ip = non_empty(device.ip);
    let source_id = ip.clone().ok_or(SkipRecord::MissingSourceId { kind: source })?;

    let mac_address = device
        .nodes
        .iter()
        .filter_map(|node| node.mac.as_deref())
        .find_map(MacAddress::parse);

    build(
        Fields {
            hostname: non_empty(device.dns).or_else(|| non_empty(device.name)),
            serial_number: non_empty(device.serial),
            mac_address,
            ip_address: ip,
            model: non_empty(device.model),
            vendor: non_empty(device.vendor),
            firmware_version: non_empty(device.os_ver),
        },
        source,
        source_id,
        fetched_at,
    )
}

fn from_librenms(device: LibrenmsDevice, fetched_at: DateTime<Utc>) -> Result<DeviceRecord, SkipRecord> {
    let source = SourceKind::Librenms;
    let source_id = non_empty(device.device_id).ok_or(SkipRecord::MissingSourceId { kind: source })?;

    let mac_address = device
        .ports
        .iter()
        .filter_map(|port| port.if_phys_address.as_deref())
        .find_map(MacAddress::parse);

    let model = non_empty(device.hardware);
    let vendor = non_empty(device.vendor).or_else(|| {
        model
            .as_deref()
            .and_then(vendor_from_hardware)
            .map(str::to_string)
    });

    build(
        Fields {
            hostname: non_empty(device.hostname).or_else(|| non_empty(device.sys_name)),
            serial_number: non_empty(device.serial),
            mac_address,
            ip_address: non_empty(device.ip),
            model,
            vendor,
            firmware_version: non_empty(device.version),
        },
        source,
        source_id,
        fetched_at,
    )
}

struct Fields {
    hostname: Option<String>,
    serial_number: Option<String>,
    mac_address: Option<MacAddress>,
    ip_address: Option<String>,
    model: Option<String>,
    vendor: Option<String>,
    firmware_version: Option<String>,
}

fn build(
    fields: Fields,
    source: SourceKind,
    source_id: String,
    fetched_at: DateTime<Utc>,
) -> Result<DeviceRecord, SkipRecord> {
    let has_identity = fields.serial_number.is_some() || fields.mac_address.is_some();
    if fields.hostname.is_none() && fields.ip_address.is_none() && !has_identity {
        return Err(SkipRecord::NoIdentity { kind: source, source_id });
    }

    Ok(DeviceRecord {
        hostname: fields.hostname,
        serial_number: fields.serial_number,
        mac_address: fields.mac_address,
        ip_address: fields.ip_address,
        model: fields.model,
        vendor: fields.vendor,
        firmware_version: fields.firmware_version,
        source,
        source_id,
        fetched_at,
    })
}
