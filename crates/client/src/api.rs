//! Public fetch entry point.
//!
//! [`CachedFetcher::get`] validates the caller's URL and options, builds a
//! [`FetchRequest`], and hands it to the [`RequestCoordinator`].
//!
//! Options may be built in code or deserialized from the caller-facing JSON
//! object:
//!
//! ```json
//! { "lifetime": 1000, "alternateURLs": ["https://b.example/x"], "timeout": 5000 }
//! ```
//!
//! `alternateURLs` may also be a single string. Durations are milliseconds.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::coordinator::{FetchRequest, RequestCoordinator, Resolved, Timeout};
use crate::fetch::{FetchConfig, ReqwestTransport, Transport, TrustedOrigins, candidate_list};
use resfetch_core::{AppConfig, Error, PersistentStore};

/// Per-call options for [`CachedFetcher::get`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetOptions {
    /// Freshness window for a newly fetched payload. Falls back to the
    /// fetcher's configured default (0 unless configured).
    #[serde(default, deserialize_with = "millis")]
    pub lifetime: Option<Duration>,

    /// Additional candidates racing the primary URL.
    #[serde(default, rename = "alternateURLs", deserialize_with = "one_or_many")]
    pub alternate_urls: Vec<String>,

    /// Deadline for the whole fetch.
    #[serde(default, deserialize_with = "millis")]
    pub timeout: Option<Duration>,

    /// Caller-held cancellation; firing it behaves like a timeout.
    #[serde(skip)]
    pub cancel: Option<CancellationToken>,
}

impl GetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn with_alternate(mut self, url: impl Into<String>) -> Self {
        self.alternate_urls.push(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Fold the timeout and the caller's token into one deadline.
    ///
    /// When both are set, a child of the caller's token is cancelled when the
    /// timeout elapses. The returned guard stops that timer when dropped and
    /// never cancels the caller's own token.
    fn deadline(&self) -> (Option<Timeout>, Option<DropGuard>) {
        match (self.timeout, &self.cancel) {
            (None, None) => (None, None),
            (Some(limit), None) => (Some(Timeout::After(limit)), None),
            (None, Some(token)) => (Some(Timeout::Signal(token.clone())), None),
            (Some(limit), Some(token)) => {
                let child = token.child_token();
                let timer = child.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = tokio::time::sleep(limit) => timer.cancel(),
                        _ = timer.cancelled() => {}
                    }
                });
                (Some(Timeout::Signal(child.clone())), Some(child.drop_guard()))
            }
        }
    }
}

fn millis<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(url)) => vec![url],
        Some(OneOrMany::Many(urls)) => urls,
    })
}

/// Cache-backed fetcher for remote resources.
#[derive(Debug, Clone)]
pub struct CachedFetcher {
    coordinator: RequestCoordinator,
    default_lifetime: Duration,
}

impl CachedFetcher {
    pub fn new(store: PersistentStore, transport: Arc<dyn Transport>, origins: TrustedOrigins) -> Self {
        Self { coordinator: RequestCoordinator::new(store, transport, origins), default_lifetime: Duration::ZERO }
    }

    /// Probe the cache tiers and build the reqwest transport from `config`.
    pub async fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let transport = ReqwestTransport::new(FetchConfig::from(config))?;
        let store = PersistentStore::open(config).await;
        let origins = TrustedOrigins::new(&config.trusted_origins);

        tracing::debug!(tiers = ?store.tiers().collect::<Vec<_>>(), "fetcher ready");

        Ok(Self::new(store, Arc::new(transport), origins).with_default_lifetime(config.default_lifetime()))
    }

    pub fn with_default_lifetime(mut self, lifetime: Duration) -> Self {
        self.default_lifetime = lifetime;
        self
    }

    pub fn store(&self) -> &PersistentStore {
        self.coordinator.store()
    }

    /// Fetch `url`, racing any alternates, with cache and stale fallback.
    ///
    /// Fails with [`Error::Configuration`] for an empty URL and
    /// [`Error::InvalidUrl`] for a URL that cannot be canonicalized, in both
    /// cases before any cache or network access.
    pub async fn get(&self, url: &str, options: GetOptions) -> Result<Resolved, Error> {
        let candidates = candidate_list(url, &options.alternate_urls)?;
        let key = candidates
            .first()
            .map(ToString::to_string)
            .ok_or_else(|| Error::Configuration("url is required".into()))?;

        let (timeout, _timer) = options.deadline();
        let request = FetchRequest {
            key,
            candidates,
            lifetime: options.lifetime.unwrap_or(self.default_lifetime),
            timeout,
        };

        self.coordinator.fetch(request).await.into_result()
    }

    /// [`get`](Self::get) and decode the payload as JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, options: GetOptions) -> Result<T, Error> {
        self.get(url, options).await?.json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::Source;
    use crate::testing::{MockTransport, Reply};
    use bytes::Bytes;
    use chrono::{TimeDelta, Utc};
    use resfetch_core::CacheDb;

    const A: &str = "https://a.example/x";
    const B: &str = "https://b.example/x";

    async fn fetcher(mock: MockTransport) -> (CachedFetcher, Arc<MockTransport>) {
        let store = PersistentStore::new(vec![Arc::new(CacheDb::open_in_memory().await.unwrap())]);
        let transport = Arc::new(mock);
        (CachedFetcher::new(store, transport.clone(), TrustedOrigins::default()), transport)
    }

    #[test]
    fn test_options_from_json_array() {
        let options: GetOptions =
            serde_json::from_str(r#"{"lifetime": 1000, "alternateURLs": ["https://b.example/x"], "timeout": 50}"#)
                .unwrap();
        assert_eq!(options.lifetime, Some(Duration::from_millis(1000)));
        assert_eq!(options.alternate_urls, vec![B.to_string()]);
        assert_eq!(options.timeout, Some(Duration::from_millis(50)));
        assert!(options.cancel.is_none());
    }

    #[test]
    fn test_options_from_json_single_string() {
        let options: GetOptions = serde_json::from_str(r#"{"alternateURLs": "https://b.example/x"}"#).unwrap();
        assert_eq!(options.alternate_urls, vec![B.to_string()]);
        assert!(options.lifetime.is_none());
    }

    #[test]
    fn test_options_from_empty_json() {
        let options: GetOptions = serde_json::from_str("{}").unwrap();
        assert!(options.alternate_urls.is_empty());
        assert!(options.timeout.is_none());

        let options: GetOptions = serde_json::from_str(r#"{"alternateURLs": null}"#).unwrap();
        assert!(options.alternate_urls.is_empty());
    }

    #[tokio::test]
    async fn test_empty_url_fails_before_fetching() {
        let (fetcher, transport) = fetcher(MockTransport::new()).await;

        let err = fetcher.get("  ", GetOptions::new()).await.unwrap_err();

        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_alternate_fails_before_fetching() {
        let (fetcher, transport) = fetcher(MockTransport::new()).await;

        let err = fetcher.get(A, GetOptions::new().with_alternate("ftp://b.example/x")).await.unwrap_err();

        assert!(matches!(err, Error::InvalidUrl(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failover_then_cache_hit() {
        let mock = MockTransport::new()
            .reply(A, Reply::Fail { delay_ms: 0 })
            .reply(B, Reply::Body { delay_ms: 5, body: b"P" });
        let (fetcher, transport) = fetcher(mock).await;
        let options: GetOptions =
            serde_json::from_str(r#"{"lifetime": 1000, "alternateURLs": ["https://b.example/x"]}"#).unwrap();

        let first = fetcher.get(A, options.clone()).await.unwrap();
        assert_eq!((first.payload.clone(), first.source), (Bytes::from_static(b"P"), Source::Network));

        let second = fetcher.get(A, options).await.unwrap();
        assert_eq!((second.payload, second.source), (Bytes::from_static(b"P"), Source::Cache));
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_cache_key_is_canonical_primary() {
        let (fetcher, transport) = fetcher(MockTransport::new()).await;
        fetcher
            .store()
            .put_entry(A, Bytes::from_static(b"P"), Utc::now() + TimeDelta::seconds(60))
            .await;

        let resolved = fetcher.get(" A.EXAMPLE/x#section ", GetOptions::new()).await.unwrap();

        assert_eq!(resolved.source, Source::Cache);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_fallback_scenario() {
        let mock = MockTransport::new()
            .reply(A, Reply::Fail { delay_ms: 0 })
            .reply(B, Reply::Fail { delay_ms: 0 });
        let (fetcher, _) = fetcher(mock).await;
        fetcher
            .store()
            .put_entry(A, Bytes::from_static(b"Q"), Utc::now() - TimeDelta::seconds(1))
            .await;

        let resolved = fetcher.get(A, GetOptions::new().with_alternate(B)).await.unwrap();

        assert_eq!((resolved.payload, resolved.source), (Bytes::from_static(b"Q"), Source::StaleFallback));
    }

    #[tokio::test]
    async fn test_default_lifetime_applies() {
        let mock = MockTransport::new().reply(A, Reply::Body { delay_ms: 0, body: b"P" });
        let (fetcher, transport) = fetcher(mock).await;
        let fetcher = fetcher.with_default_lifetime(Duration::from_secs(60));

        fetcher.get(A, GetOptions::new()).await.unwrap();
        let again = fetcher.get(A, GetOptions::new()).await.unwrap();

        assert_eq!(again.source, Source::Cache);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_zero_lifetime_always_refetches() {
        let mock = MockTransport::new().reply(A, Reply::Body { delay_ms: 0, body: b"P" });
        let (fetcher, transport) = fetcher(mock).await;

        fetcher.get(A, GetOptions::new()).await.unwrap();
        let again = fetcher.get(A, GetOptions::new()).await.unwrap();

        assert_eq!(again.source, Source::Network);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_timeout_and_token_together() {
        let mock = MockTransport::new().reply(A, Reply::Hang);
        let (fetcher, _) = fetcher(mock).await;
        let token = CancellationToken::new();
        let options = GetOptions::new()
            .with_timeout(Duration::from_millis(20))
            .with_cancellation(token.clone());

        let err = fetcher.get(A, options).await.unwrap_err();

        assert!(matches!(err, Error::AllCandidatesFailed { .. }));
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_token_without_cache() {
        let mock = MockTransport::new().reply(A, Reply::Hang);
        let (fetcher, _) = fetcher(mock).await;
        let token = CancellationToken::new();
        token.cancel();

        let err = fetcher.get(A, GetOptions::new().with_cancellation(token)).await.unwrap_err();

        match err {
            Error::AllCandidatesFailed { last, .. } => assert!(matches!(*last, Error::Cancelled)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_get_json() {
        let mock = MockTransport::new().reply(A, Reply::Body { delay_ms: 0, body: br#"{"items":[1,2]}"# });
        let (fetcher, _) = fetcher(mock).await;

        let value: serde_json::Value = fetcher.get_json(A, GetOptions::new()).await.unwrap();

        assert_eq!(value["items"][1], 2);
    }

    #[tokio::test]
    async fn test_from_config_uses_configured_paths() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            db_path: dir.path().join("cache.sqlite"),
            flat_store_dir: dir.path().join("flat"),
            ..Default::default()
        };

        let fetcher = CachedFetcher::from_config(&config).await.unwrap();

        assert!(fetcher.store().is_enabled());
        assert!(dir.path().join("cache.sqlite").exists());
    }
}
