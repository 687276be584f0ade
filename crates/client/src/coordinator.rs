//! Request coordinator: cache check, candidate race, and fallback.
//!
//! A fetch moves through `CheckingCache -> Racing -> Resolved | Failed`:
//!
//! 1. A fresh cache entry resolves immediately without touching the network.
//! 2. Otherwise every candidate is requested concurrently, each carrying the
//!    `Content-Hash` of whatever is cached (possibly stale).
//! 3. The first candidate to succeed wins; the rest are cancelled and their
//!    results discarded. Only the winner is written to the store.
//! 4. If every candidate fails (or the deadline fires first), a stale entry
//!    is served when one exists; otherwise the fetch fails.
//!
//! All outcomes are produced by one `select!` loop, so a fetch resolves
//! exactly once no matter how many candidates race.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::fetch::{Transport, TransportRequest, TransportResponse, TrustedOrigins};
use resfetch_core::cache::expiry::compute_expiry;
use resfetch_core::{CacheEntry, Error, PersistentStore, checksum};

/// Header name for [`checksum::CHECKSUM_HEADER`].
pub const CONTENT_HASH: HeaderName = HeaderName::from_static("content-hash");

/// Deadline for a whole fetch.
#[derive(Debug, Clone)]
pub enum Timeout {
    /// Give up on the network after this long.
    After(Duration),
    /// Give up when the caller cancels this token.
    Signal(CancellationToken),
}

/// One logical fetch, built per call.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Cache key: the canonical primary URL.
    pub key: String,
    /// Primary URL followed by alternates, in caller order.
    pub candidates: Vec<Url>,
    /// Freshness window granted to a payload written by this fetch.
    pub lifetime: Duration,
    pub timeout: Option<Timeout>,
}

/// Where a resolved payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// A fresh cache entry; no request was made.
    Cache,
    /// A candidate returned a new payload.
    Network,
    /// A candidate answered "no change"; the cached payload was served.
    Revalidated,
    /// Every candidate failed; an expired cache entry was served.
    StaleFallback,
}

/// A successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub payload: Bytes,
    pub source: Source,
    /// Candidate that answered, if any.
    pub url: Option<Url>,
}

impl Resolved {
    fn cached(entry: CacheEntry, source: Source) -> Self {
        Self { payload: entry.payload, source, url: None }
    }

    /// Decode the payload as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.payload).map_err(|e| Error::Decode(e.to_string()))
    }
}

/// The single outcome of a [`FetchRequest`].
#[derive(Debug)]
pub enum FetchOutcome {
    Resolved(Resolved),
    Failed(Error),
}

impl FetchOutcome {
    pub fn into_result(self) -> Result<Resolved, Error> {
        match self {
            FetchOutcome::Resolved(resolved) => Ok(resolved),
            FetchOutcome::Failed(err) => Err(err),
        }
    }

    pub fn source(&self) -> Option<Source> {
        match self {
            FetchOutcome::Resolved(resolved) => Some(resolved.source),
            FetchOutcome::Failed(_) => None,
        }
    }
}

/// Races candidates against the cache.
#[derive(Clone)]
pub struct RequestCoordinator {
    store: PersistentStore,
    transport: Arc<dyn Transport>,
    origins: TrustedOrigins,
}

impl std::fmt::Debug for RequestCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCoordinator")
            .field("store", &self.store)
            .field("origins", &self.origins)
            .finish_non_exhaustive()
    }
}

enum Race {
    /// A candidate returned a new payload.
    Won(TransportResponse),
    /// A candidate answered "no change" for the cached entry.
    Unchanged { url: Url, entry: CacheEntry },
    /// No candidate succeeded; `stale` is the cached entry, if any.
    Lost { last: Error, stale: Option<CacheEntry> },
}

impl RequestCoordinator {
    pub fn new(store: PersistentStore, transport: Arc<dyn Transport>, origins: TrustedOrigins) -> Self {
        Self { store, transport, origins }
    }

    pub fn store(&self) -> &PersistentStore {
        &self.store
    }

    pub async fn fetch(&self, request: FetchRequest) -> FetchOutcome {
        let FetchRequest { key, candidates, lifetime, timeout } = request;

        let cached = self.store.entry(&key).await;
        if let Some(entry) = &cached
            && entry.is_fresh(Utc::now())
        {
            tracing::debug!(key = %key, "cache hit");
            return FetchOutcome::Resolved(Resolved::cached(entry.clone(), Source::Cache));
        }

        if candidates.is_empty() {
            return FetchOutcome::Failed(Error::Configuration("no candidate URLs".into()));
        }

        let attempts = candidates.len();

        match self.race(candidates, cached, timeout).await {
            Race::Unchanged { url, entry } => {
                tracing::debug!(key = %key, url = %url, "origin reported no change");
                self.store
                    .put_entry(&key, entry.payload.clone(), compute_expiry(Utc::now(), lifetime))
                    .await;
                let resolved = Resolved::cached(entry, Source::Revalidated);
                FetchOutcome::Resolved(Resolved { url: Some(url), ..resolved })
            }
            Race::Won(response) => {
                tracing::debug!(key = %key, url = %response.url, bytes = response.bytes.len(), "candidate won");
                self.store
                    .put_entry(&key, response.bytes.clone(), compute_expiry(Utc::now(), lifetime))
                    .await;
                FetchOutcome::Resolved(Resolved {
                    payload: response.bytes,
                    source: Source::Network,
                    url: Some(response.url),
                })
            }
            Race::Lost { last, stale } => match stale {
                Some(entry) => {
                    tracing::debug!(key = %key, error = %last, "all candidates failed, serving stale entry");
                    FetchOutcome::Resolved(Resolved::cached(entry, Source::StaleFallback))
                }
                None => {
                    tracing::debug!(key = %key, error = %last, "all candidates failed, nothing cached");
                    FetchOutcome::Failed(Error::AllCandidatesFailed { attempts, last: Box::new(last) })
                }
            },
        }
    }

    /// Request every candidate and return the first acceptable response.
    ///
    /// "No change" is acceptable only while `cached` holds an entry.
    /// Remaining requests are cancelled before this returns.
    async fn race(&self, candidates: Vec<Url>, mut cached: Option<CacheEntry>, timeout: Option<Timeout>) -> Race {
        let headers = checksum_headers(cached.as_ref());
        let cancel = match &timeout {
            Some(Timeout::Signal(token)) => token.child_token(),
            _ => CancellationToken::new(),
        };

        let mut race = JoinSet::new();
        for url in candidates {
            let transport = Arc::clone(&self.transport);
            let credentials = self.origins.policy_for(&url);
            let request = TransportRequest { url, headers: headers.clone(), credentials };
            let token = cancel.child_token();
            race.spawn(async move {
                let url = request.url.to_string();
                (url, transport.request(request, token).await)
            });
        }

        let deadline = async {
            match &timeout {
                Some(Timeout::After(limit)) => {
                    tokio::time::sleep(*limit).await;
                    Error::FetchTimeout(format!("no candidate answered within {}ms", limit.as_millis()))
                }
                Some(Timeout::Signal(token)) => {
                    token.cancelled().await;
                    Error::Cancelled
                }
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        let mut last = None;
        let outcome = loop {
            tokio::select! {
                biased;
                joined = race.join_next() => match joined {
                    Some(Ok((url, Ok(response)))) => {
                        if response.is_no_change() {
                            if let Some(entry) = cached.take() {
                                break Race::Unchanged { url: response.url, entry };
                            }
                            tracing::debug!(%url, "no change reported but nothing is cached");
                            let reason = "no change reported without a cached payload".to_string();
                            last = Some(Error::NetworkFailure { url, reason });
                            continue;
                        }
                        break Race::Won(response);
                    }
                    Some(Ok((url, Err(e)))) => {
                        tracing::debug!(%url, error = %e, "candidate failed");
                        last = Some(e);
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "candidate task failed");
                        let reason = format!("candidate task failed: {e}");
                        last = Some(Error::NetworkFailure { url: String::new(), reason });
                    }
                    None => {
                        let last = last.take().unwrap_or(Error::Cancelled);
                        break Race::Lost { last, stale: cached.take() };
                    }
                },
                err = &mut deadline => {
                    tracing::debug!(error = %err, "fetch deadline reached");
                    break Race::Lost { last: err, stale: cached.take() };
                }
            }
        };

        cancel.cancel();
        race.shutdown().await;
        outcome
    }
}

fn checksum_headers(cached: Option<&CacheEntry>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let value = checksum::header_value(cached.map(|entry| entry.payload.as_ref()));
    if let Ok(value) = HeaderValue::try_from(value) {
        headers.insert(CONTENT_HASH, value);
    }
    headers
}
