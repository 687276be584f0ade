//! HTTP transport for racing candidates.
//!
//! ### URL Canonicalization
//! - Trim whitespace, ensure scheme (default: `https`)
//! - Lowercase host, remove fragments
//! - Preserve query string
//!
//! ### Transport contract
//! - One request per candidate, cancellable through a [`CancellationToken`]
//! - `204 No Content` is the origin's "unchanged" answer to `Content-Hash`
//! - Any other non-2xx status is a failure of that candidate
//! - Max redirects: 5, max body bytes: 5MB (configurable)
//!
//! ### Credentials
//! - Cookies are kept and sent only for trusted origins

pub mod credentials;
pub mod url;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use reqwest::{Client, StatusCode, header};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub use credentials::{CredentialsPolicy, TrustedOrigins};
pub use self::url::{UrlError, candidate_list, canonicalize};

use resfetch_core::{AppConfig, Error};

/// Configuration for the reqwest transport.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "resfetch/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Per-candidate timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "resfetch/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            max_redirects: config.max_redirects,
        }
    }
}

/// A single candidate request.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: Url,
    pub headers: header::HeaderMap,
    pub credentials: CredentialsPolicy,
}

/// Response from one candidate.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// The candidate URL requested
    pub url: Url,
    /// The final URL after redirects
    pub final_url: Url,
    /// HTTP status code
    pub status: StatusCode,
    /// Response body bytes (empty for 204)
    pub bytes: Bytes,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

impl TransportResponse {
    /// Whether the origin recognized the checksum and skipped the body.
    pub fn is_no_change(&self) -> bool {
        self.status == StatusCode::NO_CONTENT
    }
}

/// Network access used by the request coordinator.
///
/// Implementations must return promptly with [`Error::Cancelled`] once
/// `cancel` fires, and must not panic if it fires after completion.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, request: TransportRequest, cancel: CancellationToken) -> Result<TransportResponse, Error>;
}

/// reqwest-backed transport.
///
/// Holds two clients: one with a cookie store for trusted origins and one
/// without for everything else, so credentials never leak across origins.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    credentialed: Client,
    anonymous: Client,
    config: FetchConfig,
}

impl ReqwestTransport {
    /// Create a new transport with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let credentialed = Self::builder(&config)
            .cookie_store(true)
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?;
        let anonymous = Self::builder(&config)
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { credentialed, anonymous, config })
    }

    fn builder(config: &FetchConfig) -> reqwest::ClientBuilder {
        Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, Error> {
        let start = Instant::now();
        let url = request.url;
        let client = match request.credentials {
            CredentialsPolicy::Include => &self.credentialed,
            CredentialsPolicy::Omit => &self.anonymous,
        };

        let response = client
            .get(url.as_str())
            .headers(request.headers)
            .send()
            .await
            .map_err(|e| network_error(&url, &e))?;

        let status = response.status();

        if !status.is_success() {
            return Err(Error::NetworkFailure { url: url.to_string(), reason: format!("status {}", status.as_u16()) });
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let final_url = response.url().clone();

        let bytes = response.bytes().await.map_err(|e| network_error(&url, &e))?;

        if bytes.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", bytes.len(), self.config.max_bytes)));
        }

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            "fetched {} -> {} [{}] in {}ms ({} bytes)",
            url,
            final_url,
            status.as_u16(),
            fetch_ms,
            bytes.len()
        );

        Ok(TransportResponse { url, final_url, status, bytes, fetch_ms })
    }
}

fn network_error(url: &Url, err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::FetchTimeout(format!("{url}: {err}"))
    } else {
        Error::NetworkFailure { url: url.to_string(), reason: err.to_string() }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn request(&self, request: TransportRequest, cancel: CancellationToken) -> Result<TransportResponse, Error> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = self.send(request) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "resfetch/0.1");
        assert_eq!(config.max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.timeout, Duration::from_millis(20000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app_config() {
        let app = AppConfig { user_agent: "probe/1".into(), timeout_ms: 750, max_redirects: 2, ..Default::default() };
        let config = FetchConfig::from(&app);
        assert_eq!(config.user_agent, "probe/1");
        assert_eq!(config.timeout, Duration::from_millis(750));
        assert_eq!(config.max_redirects, 2);
    }

    #[test]
    fn test_no_change_detection() {
        let url = Url::parse("https://a.example/x").unwrap();
        let mut response = TransportResponse {
            url: url.clone(),
            final_url: url,
            status: StatusCode::NO_CONTENT,
            bytes: Bytes::new(),
            fetch_ms: 3,
        };
        assert!(response.is_no_change());

        response.status = StatusCode::OK;
        assert!(!response.is_no_change());
    }

    #[tokio::test]
    async fn test_transport_new() {
        assert!(ReqwestTransport::new(FetchConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let transport = ReqwestTransport::new(FetchConfig::default()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let request = TransportRequest {
            url: Url::parse("https://a.example/x").unwrap(),
            headers: header::HeaderMap::new(),
            credentials: CredentialsPolicy::Omit,
        };

        let result = transport.request(request, cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
