//! Source clients
//!
//! One client per external system. Every client exposes the same contract
//! (`authenticate`, `list_devices`, and the composed `fetch`) and owns its
//! transport: rate limiting and retry live in [`http::HttpTransport`], one
//! instance per client, so no limiter state is shared across sources.
//!
//! Raw payloads keep each source's native shape as a distinct variant of
//! [`RawPayload`]; only the normalizer looks inside them.

pub mod http;
pub mod librenms;
pub mod netdisco;

mod lenient;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::models::SourceKind;

pub use http::{HttpTransport, RetryPolicy, TransportSettings};
pub use librenms::{LibrenmsClient, LibrenmsDevice, LibrenmsPort};
pub use netdisco::{NetdiscoClient, NetdiscoDevice, NetdiscoNode};

/// Source client errors
#[derive(Debug, Error)]
pub enum SourceError {
    /// Credentials rejected; never retried
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Source answered 429; retried with backoff
    #[error("Rate limited by source")]
    RateLimited,

    /// Connect/timeout/body read failure; retried with backoff
    #[error("Network error: {0}")]
    Network(String),

    /// 5xx response; retried with backoff
    #[error("Server error {status}: {body}")]
    Server { status: u16, body: String },

    /// Retryable failure that outlived the attempt ceiling
    #[error("Transient failure after {attempts} attempts: {message}")]
    Transient { attempts: u32, message: String },

    /// Payload could not be parsed; the whole source is abandoned
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Non-retryable 4xx other than authentication
    #[error("Request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Cancelled")]
    Cancelled,

    /// Missing base URL, wrong credential kind, invalid settings
    #[error("Source not configured: {0}")]
    NotConfigured(String),
}

impl SourceError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SourceError::RateLimited | SourceError::Network(_) | SourceError::Server { .. }
        )
    }
}

/// Opaque per-source credentials
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Netdisco login
    UserPassword { username: String, password: String },
    /// LibreNMS API token
    ApiToken(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::UserPassword { username, .. } => f
                .debug_struct("UserPassword")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::ApiToken(_) => f.debug_tuple("ApiToken").field(&"<redacted>").finish(),
        }
    }
}

/// Authenticated session: the header every subsequent call carries
#[derive(Clone)]
pub struct AuthSession {
    pub header_name: &'static str,
    pub header_value: String,
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("header_name", &self.header_name)
            .field("header_value", &"<redacted>")
            .finish()
    }
}

/// Per-fetch constraints
#[derive(Debug, Clone, Default)]
pub struct FetchConstraints {
    /// Aborts in-flight calls and rate-limit waits
    pub cancel: CancellationToken,
}

impl FetchConstraints {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

/// Source-native device payload, tagged by source
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    Netdisco(NetdiscoDevice),
    Librenms(LibrenmsDevice),
}

impl RawPayload {
    pub fn kind(&self) -> SourceKind {
        match self {
            RawPayload::Netdisco(_) => SourceKind::Netdisco,
            RawPayload::Librenms(_) => SourceKind::Librenms,
        }
    }
}

/// Contract every source client implements
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Which source this client talks to
    fn kind(&self) -> SourceKind;

    /// Exchange credentials for an authenticated session
    ///
    /// Authentication failures surface as [`SourceError::Auth`] and are never
    /// retried.
    async fn authenticate(
        &self,
        credentials: &Credentials,
        constraints: &FetchConstraints,
    ) -> Result<AuthSession, SourceError>;

    /// List all devices with per-device enrichment applied
    async fn list_devices(
        &self,
        session: &AuthSession,
        constraints: &FetchConstraints,
    ) -> Result<Vec<RawPayload>, SourceError>;

    /// Authenticate, then list devices
    async fn fetch(
        &self,
        credentials: &Credentials,
        constraints: &FetchConstraints,
    ) -> Result<Vec<RawPayload>, SourceError> {
        let session = self.authenticate(credentials, constraints).await?;
        self.list_devices(&session, constraints).await
    }

    /// Check reachability and credentials without listing devices
    async fn test_connection(&self, credentials: &Credentials) -> Result<(), SourceError> {
        self.authenticate(credentials, &FetchConstraints::default())
            .await
            .map(|_| ())
    }
}
