//! Canonical device observations
//!
//! A `DeviceRecord` is what every source's payload is normalized into. Nothing
//! downstream of the normalizer ever sees a source-native shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// External system providing device inventory data
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Netdisco network discovery
    Netdisco,
    /// LibreNMS monitoring
    Librenms,
}

impl SourceKind {
    pub const ALL: [SourceKind; 2] = [SourceKind::Netdisco, SourceKind::Librenms];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Netdisco => "netdisco",
            SourceKind::Librenms => "librenms",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "netdisco" => Ok(SourceKind::Netdisco),
            "librenms" => Ok(SourceKind::Librenms),
            other => Err(format!("unknown source: {}", other)),
        }
    }
}

/// MAC address in canonical lowercase colon-separated form (`aa:bb:cc:dd:ee:ff`)
///
/// Accepts colon, hyphen, dot (Cisco) and separator-less input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress(String);

impl MacAddress {
    /// Canonicalize a MAC address; `None` when it is not 12 hex digits
    pub fn parse(input: &str) -> Option<Self> {
        let hex: String = input
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | '.') && !c.is_whitespace())
            .collect();

        if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }

        let hex = hex.to_ascii_lowercase();
        let octets: Vec<&str> = (0..12).step_by(2).map(|i| &hex[i..i + 2]).collect();
        Some(MacAddress(octets.join(":")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for MacAddress {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        MacAddress::parse(&value).ok_or_else(|| format!("invalid MAC address: {}", value))
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.0
    }
}

/// Canonical, source-agnostic observation of one device
///
/// At least one of `serial_number`/`mac_address` should be present for
/// reliable matching; records without either still flow through on the
/// low-confidence hostname + IP path.
///
/// `hostname` is only what the source reported. Use [`DeviceRecord::display_name`]
/// where a name is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub hostname: Option<String>,
    pub serial_number: Option<String>,
    pub mac_address: Option<MacAddress>,
    pub ip_address: Option<String>,
    pub model: Option<String>,
    pub vendor: Option<String>,
    pub firmware_version: Option<String>,
    /// Source that produced this observation
    pub source: SourceKind,
    /// Source-native id (Netdisco IP, LibreNMS device_id)
    pub source_id: String,
    pub fetched_at: DateTime<Utc>,
}

impl DeviceRecord {
    /// True when the record carries a serial number or MAC address
    pub fn has_identity(&self) -> bool {
        self.serial_number.is_some() || self.mac_address.is_some()
    }

    /// Reported hostname, else the IP address, else the source-native id
    pub fn display_name(&self) -> &str {
        self.hostname
            .as_deref()
            .or(self.ip_address.as_deref())
            .unwrap_or(&self.source_id)
    }

    /// Short human-readable identity for logs and error lists
    pub fn label(&self) -> String {
        let name = self.display_name();
        if let Some(serial) = &self.serial_number {
            format!("{} (serial {})", name, serial)
        } else if let Some(mac) = &self.mac_address {
            format!("{} (mac {})", name, mac)
        } else {
            match (&self.hostname, &self.ip_address) {
                (Some(_), Some(ip)) => format!("{} ({})", name, ip),
                _ => name.to_string(),
            }
        }
    }
}

/// Trim a string field, treating blank values as absent
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == v.len() {
            Some(v)
        } else {
            Some(trimmed.to_string())
        }
    })
}
