//! LibreNMS client
//!
//! Authentication: static API token in the `X-Auth-Token` header, validated
//! against `GET /api/v0/system`.
//!
//! Endpoints:
//! - `GET /api/v0/devices` lists devices
//! - `GET /api/v0/devices/{device_id}/ports` interfaces with physical addresses

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::http::{HttpTransport, TransportSettings};
use super::{lenient, AuthSession, Credentials, FetchConstraints, RawPayload, SourceClient, SourceError};
use crate::models::SourceKind;

const TOKEN_HEADER: &str = "X-Auth-Token";

/// Device row as LibreNMS returns it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibrenmsDevice {
    /// Numeric in LibreNMS, kept as text
    #[serde(default, deserialize_with = "lenient::string")]
    pub device_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub hostname: Option<String>,
    #[serde(default, rename = "sysName", deserialize_with = "lenient::string")]
    pub sys_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub ip: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub serial: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub hardware: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub vendor: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub version: Option<String>,
    /// Filled from the ports endpoint
    #[serde(default)]
    pub ports: Vec<LibrenmsPort>,
}

/// One interface of a device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibrenmsPort {
    #[serde(default, rename = "ifPhysAddress", deserialize_with = "lenient::string")]
    pub if_phys_address: Option<String>,
}

#[derive(Deserialize)]
struct DevicesResponse {
    #[serde(default)]
    devices: Vec<LibrenmsDevice>,
}

#[derive(Deserialize)]
struct PortsResponse {
    #[serde(default)]
    ports: Vec<LibrenmsPort>,
}

/// LibreNMS API client
pub struct LibrenmsClient {
    transport: HttpTransport,
}

impl LibrenmsClient {
    pub fn new(settings: &TransportSettings) -> Result<Self, SourceError> {
        Ok(Self {
            transport: HttpTransport::new(SourceKind::Librenms, settings)?,
        })
    }

    async fn device_ports(
        &self,
        session: &AuthSession,
        device_id: &str,
        constraints: &FetchConstraints,
    ) -> Result<Vec<LibrenmsPort>, SourceError> {
        let url = self.transport.url(&format!("/api/v0/devices/{}/ports", device_id));
        let result = self
            .transport
            .get_json::<PortsResponse, _>(
                "device ports",
                |client| {
                    client
                        .get(&url)
                        .header(session.header_name, &session.header_value)
                        .query(&[("columns", "ifPhysAddress")])
                },
                &constraints.cancel,
            )
            .await;

        match result {
            Ok(response) => Ok(response.ports),
            Err(SourceError::Rejected { status, .. }) => {
                debug!(device_id, status, "No LibreNMS ports for device");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl SourceClient for LibrenmsClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Librenms
    }

    async fn authenticate(
        &self,
        credentials: &Credentials,
        constraints: &FetchConstraints,
    ) -> Result<AuthSession, SourceError> {
        let token = match credentials {
            Credentials::ApiToken(token) => token,
            Credentials::UserPassword { .. } => {
                return Err(SourceError::NotConfigured(
                    "librenms requires an API token".to_string(),
                ))
            }
        };

        let session = AuthSession {
            header_name: TOKEN_HEADER,
            header_value: token.clone(),
        };

        let url = self.transport.url("/api/v0/system");
        self.transport
            .send(
                "validate token",
                |client| client.get(&url).header(session.header_name, &session.header_value),
                &constraints.cancel,
            )
            .await?;

        info!(source = %SourceKind::Librenms, "Authentication successful");
        Ok(session)
    }

    async fn list_devices(
        &self,
        session: &AuthSession,
        constraints: &FetchConstraints,
    ) -> Result<Vec<RawPayload>, SourceError> {
        let url = self.transport.url("/api/v0/devices");
        let response: DevicesResponse = self
            .transport
            .get_json(
                "list devices",
                |client| client.get(&url).header(session.header_name, &session.header_value),
                &constraints.cancel,
            )
            .await?;

        let devices = response.devices;
        info!(source = %SourceKind::Librenms, count = devices.len(), "Found devices");

        let mut payloads = Vec::with_capacity(devices.len());
        for mut device in devices {
            if let Some(device_id) = device.device_id.clone() {
                device.ports = self.device_ports(session, &device_id, constraints).await?;
            }
            payloads.push(RawPayload::Librenms(device));
        }

        Ok(payloads)
    }
}
