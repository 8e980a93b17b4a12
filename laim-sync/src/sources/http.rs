//! Rate-limited, retrying HTTP transport shared by the source clients
//!
//! Each client owns one transport. Calls wait (cooperatively) for a
//! token-bucket permit before every attempt, then retry transient failures
//! (network, 5xx, 429) with exponential backoff up to `max_attempts`.
//! Authentication failures and other 4xx responses return immediately.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::SourceError;
use crate::models::SourceKind;

const USER_AGENT: &str = concat!("laim-sync/", env!("CARGO_PKG_VERSION"));

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Retry ceiling and backoff base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each further attempt
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

/// Connection settings for one transport
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub base_url: String,
    /// Outbound call ceiling; `<= 0` disables limiting
    pub requests_per_second: f64,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub verify_tls: bool,
}

/// Response body with its status, read inside the retry loop
#[derive(Debug)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

impl HttpReply {
    /// Parse the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, SourceError> {
        serde_json::from_str(&self.body).map_err(|e| SourceError::Malformed(e.to_string()))
    }
}

/// HTTP transport with private rate limiter and retry policy
pub struct HttpTransport {
    kind: SourceKind,
    client: Client,
    base_url: String,
    limiter: Option<DirectLimiter>,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(kind: SourceKind, settings: &TransportSettings) -> Result<Self, SourceError> {
        let base_url = settings.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(SourceError::NotConfigured(format!("{}: base URL is empty", kind)));
        }
        if settings.retry.max_attempts == 0 {
            return Err(SourceError::NotConfigured(format!(
                "{}: max_attempts must be at least 1",
                kind
            )));
        }

        let limiter = if settings.requests_per_second.is_finite() && settings.requests_per_second > 0.0 {
            let quota = Duration::try_from_secs_f64(1.0 / settings.requests_per_second)
                .ok()
                .and_then(Quota::with_period)
                .ok_or_else(|| {
                    SourceError::NotConfigured(format!(
                        "{}: requests_per_second {} is out of range",
                        kind, settings.requests_per_second
                    ))
                })?;
            Some(RateLimiter::direct(quota))
        } else {
            None
        };

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.timeout)
            .connect_timeout(settings.timeout.min(Duration::from_secs(10)))
            .danger_accept_invalid_certs(!settings.verify_tls)
            .build()
            .map_err(|e| SourceError::NotConfigured(format!("{}: {}", kind, e)))?;

        Ok(Self {
            kind,
            client,
            base_url,
            limiter,
            retry: settings.retry,
        })
    }

    /// Absolute URL for an endpoint path
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Wait for a rate-limit permit
    pub async fn wait_for_permit(&self, cancel: &CancellationToken) -> Result<(), SourceError> {
        if let Some(limiter) = &self.limiter {
            tokio::select! {
                _ = cancel.cancelled() => return Err(SourceError::Cancelled),
                _ = limiter.until_ready() => {}
            }
        }
        Ok(())
    }

    /// Send a request with rate limiting and retry
    ///
    /// `build` is called once per attempt. Returns the first 2xx reply.
    pub async fn send<F>(
        &self,
        operation: &str,
        build: F,
        cancel: &CancellationToken,
    ) -> Result<HttpReply, SourceError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.wait_for_permit(cancel).await?;

            debug!(source = %self.kind, operation, attempt, "Sending request");

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(SourceError::Cancelled),
                result = Self::attempt(build(&self.client)) => result,
            };

            let err = match result {
                Ok(reply) => return Ok(reply),
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(err);
            }

            if attempt >= self.retry.max_attempts {
                warn!(
                    source = %self.kind,
                    operation,
                    attempts = attempt,
                    error = %err,
                    "Retries exhausted"
                );
                return Err(SourceError::Transient {
                    attempts: attempt,
                    message: err.to_string(),
                });
            }

            let delay = self.retry.backoff(attempt);
            warn!(
                source = %self.kind,
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient failure, backing off"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(SourceError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Send a request and parse the 2xx body as JSON
    pub async fn get_json<T, F>(
        &self,
        operation: &str,
        build: F,
        cancel: &CancellationToken,
    ) -> Result<T, SourceError>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        self.send(operation, build, cancel).await?.json()
    }

    /// One attempt: send, read body, classify status
    async fn attempt(request: RequestBuilder) -> Result<HttpReply, SourceError> {
        let response = request
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        classify(status, body)
    }
}

/// Map an HTTP status to the source error taxonomy
fn classify(status: StatusCode, body: String) -> Result<HttpReply, SourceError> {
    if status.is_success() {
        return Ok(HttpReply { status, body });
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(SourceError::Auth(format!("{}: {}", status, truncate(&body))))
        }
        StatusCode::TOO_MANY_REQUESTS => Err(SourceError::RateLimited),
        s if s.is_server_error() => Err(SourceError::Server {
            status: s.as_u16(),
            body: truncate(&body),
        }),
        s => Err(SourceError::Rejected {
            status: s.as_u16(),
            body: truncate(&body),
        }),
    }
}

fn truncate(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn settings(rps: f64) -> TransportSettings {
        TransportSettings {
            base_url: "http://127.0.0.1:9/".into(),
            requests_per_second: rps,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(5),
            verify_tls: true,
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn test_classify_statuses() {
        assert!(classify(StatusCode::OK, "{}".into()).is_ok());
        assert!(matches!(
            classify(StatusCode::UNAUTHORIZED, String::new()),
            Err(SourceError::Auth(_))
        ));
        assert!(matches!(
            classify(StatusCode::FORBIDDEN, String::new()),
            Err(SourceError::Auth(_))
        ));
        assert!(matches!(
            classify(StatusCode::TOO_MANY_REQUESTS, String::new()),
            Err(SourceError::RateLimited)
        ));
        assert!(matches!(
            classify(StatusCode::BAD_GATEWAY, String::new()),
            Err(SourceError::Server { status: 502, .. })
        ));
        assert!(matches!(
            classify(StatusCode::NOT_FOUND, String::new()),
            Err(SourceError::Rejected { status: 404, .. })
        ));
    }

    #[test]
    fn test_url_joins_cleanly() {
        let transport = HttpTransport::new(SourceKind::Netdisco, &settings(10.0)).unwrap();
        assert_eq!(transport.url("/api/v1/x"), "http://127.0.0.1:9/api/v1/x");
        assert_eq!(transport.url("login"), "http://127.0.0.1:9/login");
    }

    #[test]
    fn test_empty_base_url_rejected() {
        let mut s = settings(10.0);
        s.base_url = "  ".into();
        assert!(matches!(
            HttpTransport::new(SourceKind::Librenms, &s),
            Err(SourceError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_out_of_range_rate_rejected() {
        for rps in [1e-300, 1e300] {
            assert!(
                matches!(
                    HttpTransport::new(SourceKind::Netdisco, &settings(rps)),
                    Err(SourceError::NotConfigured(_))
                ),
                "rps {}",
                rps
            );
        }
    }

    #[tokio::test]
    async fn test_rate_limiter_spacing() {
        // 20 req/s: one permit every 50ms
        let transport = HttpTransport::new(SourceKind::Netdisco, &settings(20.0)).unwrap();
        let cancel = CancellationToken::new();

        let start = Instant::now();
        for _ in 0..3 {
            transport.wait_for_permit(&cancel).await.unwrap();
        }
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(90), "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_permit_wait_honors_cancellation() {
        // 1 request per 100s: the second permit would block for a long time
        let transport = HttpTransport::new(SourceKind::Netdisco, &settings(0.01)).unwrap();
        let cancel = CancellationToken::new();
        transport.wait_for_permit(&cancel).await.unwrap();

        cancel.cancel();
        let result = transport.wait_for_permit(&cancel).await;
        assert!(matches!(result, Err(SourceError::Cancelled)));
    }

    #[tokio::test]
    async fn test_unlimited_when_rate_is_zero() {
        let transport = HttpTransport::new(SourceKind::Netdisco, &settings(0.0)).unwrap();
        let cancel = CancellationToken::new();

        let start = Instant::now();
        for _ in 0..10 {
            transport.wait_for_permit(&cancel).await.unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
