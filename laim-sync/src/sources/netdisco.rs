//! Netdisco client
//!
//! Authentication: `POST /login` with username/password returns an API key,
//! sent as a bearer token on every later call.
//!
//! Endpoints:
//! - `GET /api/v1/search/device?q=` lists devices
//! - `GET /api/v1/object/device/{ip}` device details (merged over the search row)
//! - `GET /api/v1/object/device/{ip}/nodes` MAC addresses seen on the device

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::http::{HttpTransport, TransportSettings};
use super::{lenient, AuthSession, Credentials, FetchConstraints, RawPayload, SourceClient, SourceError};
use crate::models::SourceKind;

/// Device row as Netdisco returns it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetdiscoDevice {
    /// Primary key in Netdisco
    #[serde(default, deserialize_with = "lenient::string")]
    pub ip: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub dns: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub serial: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub vendor: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub os_ver: Option<String>,
    /// Filled from the nodes endpoint
    #[serde(default)]
    pub nodes: Vec<NetdiscoNode>,
}

impl NetdiscoDevice {
    /// Overlay non-empty detail fields onto the search row
    fn merge_details(&mut self, details: NetdiscoDevice) {
        fn overlay(target: &mut Option<String>, value: Option<String>) {
            if value.is_some() {
                *target = value;
            }
        }
        overlay(&mut self.dns, details.dns);
        overlay(&mut self.name, details.name);
        overlay(&mut self.serial, details.serial);
        overlay(&mut self.model, details.model);
        overlay(&mut self.vendor, details.vendor);
        overlay(&mut self.os_ver, details.os_ver);
    }
}

/// Node (MAC sighting) attached to a device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetdiscoNode {
    #[serde(default, deserialize_with = "lenient::string")]
    pub mac: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    List(Vec<NetdiscoDevice>),
    Wrapped { devices: Vec<NetdiscoDevice> },
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    key: Option<String>,
}

/// Netdisco API client
pub struct NetdiscoClient {
    transport: HttpTransport,
}

impl NetdiscoClient {
    pub fn new(settings: &TransportSettings) -> Result<Self, SourceError> {
        Ok(Self {
            transport: HttpTransport::new(SourceKind::Netdisco, settings)?,
        })
    }

    async fn search_devices(
        &self,
        session: &AuthSession,
        constraints: &FetchConstraints,
    ) -> Result<Vec<NetdiscoDevice>, SourceError> {
        let url = self.transport.url("/api/v1/search/device");
        let response: SearchResponse = self
            .transport
            .get_json(
                "search devices",
                |client| {
                    client
                        .get(&url)
                        .header(session.header_name, &session.header_value)
                        .query(&[("q", "")])
                },
                &constraints.cancel,
            )
            .await?;

        Ok(match response {
            SearchResponse::List(devices) => devices,
            SearchResponse::Wrapped { devices } => devices,
        })
    }

    /// Device details; `None` when Netdisco has no detail record
    async fn device_details(
        &self,
        session: &AuthSession,
        ip: &str,
        constraints: &FetchConstraints,
    ) -> Result<Option<NetdiscoDevice>, SourceError> {
        let url = self.transport.url(&format!("/api/v1/object/device/{}", ip));
        let result = self
            .transport
            .get_json(
                "device details",
                |client| client.get(&url).header(session.header_name, &session.header_value),
                &constraints.cancel,
            )
            .await;

        match result {
            Ok(details) => Ok(Some(details)),
            Err(SourceError::Rejected { status, .. }) => {
                debug!(ip, status, "No Netdisco details for device");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn device_nodes(
        &self,
        session: &AuthSession,
        ip: &str,
        constraints: &FetchConstraints,
    ) -> Result<Vec<NetdiscoNode>, SourceError> {
        let url = self.transport.url(&format!("/api/v1/object/device/{}/nodes", ip));
        let result = self
            .transport
            .get_json::<Value, _>(
                "device nodes",
                |client| client.get(&url).header(session.header_name, &session.header_value),
                &constraints.cancel,
            )
            .await;

        match result {
            Ok(Value::Array(items)) => items
                .into_iter()
                .map(|item| serde_json::from_value(item).map_err(|e| SourceError::Malformed(e.to_string())))
                .collect(),
            // Netdisco answers an object when a device has no node table
            Ok(_) => Ok(Vec::new()),
            Err(SourceError::Rejected { status, .. }) => {
                debug!(ip, status, "No Netdisco nodes for device");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl SourceClient for NetdiscoClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Netdisco
    }

    async fn authenticate(
        &self,
        credentials: &Credentials,
        constraints: &FetchConstraints,
    ) -> Result<AuthSession, SourceError> {
        let (username, password) = match credentials {
            Credentials::UserPassword { username, password } => (username, password),
            Credentials::ApiToken(_) => {
                return Err(SourceError::NotConfigured(
                    "netdisco requires username/password credentials".to_string(),
                ))
            }
        };

        let url = self.transport.url("/login");
        let reply = self
            .transport
            .send(
                "login",
                |client| {
                    client
                        .post(&url)
                        .form(&[("username", username.as_str()), ("password", password.as_str())])
                },
                &constraints.cancel,
            )
            .await?;

        let login: LoginResponse = reply.json()?;
        let api_key = login
            .api_key
            .or(login.key)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| SourceError::Auth("login response carried no API key".to_string()))?;

        info!(source = %SourceKind::Netdisco, "Authentication successful");

        Ok(AuthSession {
            header_name: "Authorization",
            header_value: format!("Bearer {}", api_key),
        })
    }

    async fn list_devices(
        &self,
        session: &AuthSession,
        constraints: &FetchConstraints,
    ) -> Result<Vec<RawPayload>, SourceError> {
        let devices = self.search_devices(session, constraints).await?;
        info!(source = %SourceKind::Netdisco, count = devices.len(), "Found devices");

        let mut payloads = Vec::with_capacity(devices.len());
        for mut device in devices {
            // Rows without an IP cannot be enriched; the normalizer drops them
            if let Some(ip) = device.ip.clone() {
                if let Some(details) = self.device_details(session, &ip, constraints).await? {
                    device.merge_details(details);
                }
                device.nodes = self.device_nodes(session, &ip, constraints).await?;
            }
            payloads.push(RawPayload::Netdisco(device));
        }

        Ok(payloads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_accepts_list_and_wrapped() {
        let list: SearchResponse =
            serde_json::from_str(r#"[{"ip": "10.0.0.1", "dns": "sw1.lab"}]"#).unwrap();
        assert!(matches!(list, SearchResponse::List(ref d) if d.len() == 1));

        let wrapped: SearchResponse =
            serde_json::from_str(r#"{"devices": [{"ip": "10.0.0.1"}, {"ip": "10.0.0.2"}]}"#).unwrap();
        assert!(matches!(wrapped, SearchResponse::Wrapped { ref devices } if devices.len() == 2));
    }

    #[test]
    fn test_details_overlay_keeps_search_values() {
        let mut row = NetdiscoDevice {
            ip: Some("10.0.0.1".into()),
            dns: Some("sw1.lab".into()),
            model: Some("WS-C2960".into()),
            ..Default::default()
        };
        row.merge_details(NetdiscoDevice {
            serial: Some("FOC123".into()),
            os_ver: Some("15.2".into()),
            ..Default::default()
        });

        assert_eq!(row.dns.as_deref(), Some("sw1.lab"));
        assert_eq!(row.model.as_deref(), Some("WS-C2960"));
        assert_eq!(row.serial.as_deref(), Some("FOC123"));
        assert_eq!(row.os_ver.as_deref(), Some("15.2"));
    }

    #[test]
    fn test_device_tolerates_numeric_fields() {
        let device: NetdiscoDevice =
            serde_json::from_str(r#"{"ip": "10.0.0.9", "serial": 12345, "vendor": null}"#).unwrap();
        assert_eq!(device.serial.as_deref(), Some("12345"));
        assert!(device.vendor.is_none());
        assert!(device.nodes.is_empty());
    }
}
