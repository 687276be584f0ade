//! Storage capability and the two-tier adapter used by the fetch layer.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::expiry::CacheEntry;
use super::{CacheDb, FlatStore};
use crate::{AppConfig, Error};

/// Identifies a storage tier in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Structured,
    Flat,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Structured => f.write_str("structured"),
            Tier::Flat => f.write_str("flat"),
        }
    }
}

/// Key/value persistence for payloads and their expiry timestamps.
///
/// Implementations report failures; deciding whether a failure matters is
/// left to [`PersistentStore`].
#[async_trait]
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    fn tier(&self) -> Tier;

    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error>;

    async fn set(&self, key: &str, value: Bytes) -> Result<(), Error>;

    async fn get_expiry(&self, key: &str) -> Result<Option<DateTime<Utc>>, Error>;

    async fn set_expiry(&self, key: &str, expiry: DateTime<Utc>) -> Result<(), Error>;

    /// Remove the payload and expiry for `key`. Missing keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), Error>;
}

/// Best-effort persistence over up to two tiers.
///
/// Reads try the structured tier first and fall through to the flat tier on
/// a miss or an error. Writes go to the structured tier and degrade to the
/// flat tier when it fails. Nothing here ever returns an error: a value that
/// cannot be read is absent, and a value that cannot be written is dropped.
#[derive(Clone, Debug, Default)]
pub struct PersistentStore {
    tiers: Vec<Arc<dyn KeyValueStore>>,
}

impl PersistentStore {
    /// Build an adapter over explicit tiers, in lookup order.
    pub fn new(tiers: Vec<Arc<dyn KeyValueStore>>) -> Self {
        Self { tiers }
    }

    /// An adapter with no tiers: every read misses and every write is dropped.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Probe both backends described by `config` and keep the ones that work.
    ///
    /// Probing happens once; a tier that fails here is never retried for the
    /// lifetime of the adapter.
    pub async fn open(config: &AppConfig) -> Self {
        if !config.cache_enabled {
            tracing::debug!("cache disabled by configuration");
            return Self::disabled();
        }

        let mut tiers: Vec<Arc<dyn KeyValueStore>> = Vec::with_capacity(2);

        match CacheDb::open(&config.db_path).await {
            Ok(db) => tiers.push(Arc::new(db)),
            Err(e) => tracing::warn!(
                path = %config.db_path.display(),
                error = %e,
                "structured cache unavailable, using flat store only"
            ),
        }

        match FlatStore::open(&config.flat_store_dir) {
            Ok(flat) => tiers.push(Arc::new(flat)),
            Err(e) => tracing::warn!(
                path = %config.flat_store_dir.display(),
                error = %e,
                "flat cache unavailable"
            ),
        }

        if tiers.is_empty() {
            tracing::warn!("no cache tier available; responses will not be persisted");
        }

        Self { tiers }
    }

    /// Tiers in lookup order.
    pub fn tiers(&self) -> impl Iterator<Item = Tier> + '_ {
        self.tiers.iter().map(|t| t.tier())
    }

    pub fn is_enabled(&self) -> bool {
        !self.tiers.is_empty()
    }

    pub async fn get(&self, key: &str) -> Option<Bytes> {
        for tier in &self.tiers {
            match tier.get(key).await {
                Ok(Some(value)) => return Some(value),
                Ok(None) => {}
                Err(e) => tracing::warn!(tier = %tier.tier(), key, error = %e, "cache read failed"),
            }
        }
        None
    }

    pub async fn get_expiry(&self, key: &str) -> Option<DateTime<Utc>> {
        for tier in &self.tiers {
            match tier.get_expiry(key).await {
                Ok(Some(expiry)) => return Some(expiry),
                Ok(None) => {}
                Err(e) => tracing::warn!(tier = %tier.tier(), key, error = %e, "cache expiry read failed"),
            }
        }
        None
    }

    pub async fn set(&self, key: &str, value: Bytes) {
        for tier in &self.tiers {
            match tier.set(key, value.clone()).await {
                Ok(()) => return,
                Err(e) => tracing::warn!(tier = %tier.tier(), key, error = %e, "cache write failed"),
            }
        }
        self.log_dropped(key);
    }

    pub async fn set_expiry(&self, key: &str, expiry: DateTime<Utc>) {
        for tier in &self.tiers {
            match tier.set_expiry(key, expiry).await {
                Ok(()) => return,
                Err(e) => tracing::warn!(tier = %tier.tier(), key, error = %e, "cache expiry write failed"),
            }
        }
        self.log_dropped(key);
    }

    /// Read the payload and expiry for `key`.
    ///
    /// Both halves come from the same tier so a degraded write never pairs a
    /// payload with another tier's expiry. A payload without an expiry reads
    /// as expired. When several tiers hold the key, the latest expiry wins;
    /// ties go to the earlier tier.
    pub async fn entry(&self, key: &str) -> Option<CacheEntry> {
        let mut found: Option<CacheEntry> = None;

        for tier in &self.tiers {
            let payload = match tier.get(key).await {
                Ok(Some(payload)) => payload,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(tier = %tier.tier(), key, error = %e, "cache read failed");
                    continue;
                }
            };

            let expiry = match tier.get_expiry(key).await {
                Ok(expiry) => expiry.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                Err(e) => {
                    tracing::warn!(tier = %tier.tier(), key, error = %e, "cache expiry read failed");
                    DateTime::<Utc>::UNIX_EPOCH
                }
            };

            if found.as_ref().is_none_or(|current| expiry > current.expiry) {
                found = Some(CacheEntry { key: key.to_string(), payload, expiry });
            }
        }

        found
    }

    /// Write a payload and its expiry to the same tier.
    ///
    /// When the write lands in a later tier, the key is deleted from the
    /// tiers before it so an older copy cannot shadow the new one.
    pub async fn put_entry(&self, key: &str, payload: Bytes, expiry: DateTime<Utc>) {
        for (index, tier) in self.tiers.iter().enumerate() {
            let written = match tier.set(key, payload.clone()).await {
                Ok(()) => tier.set_expiry(key, expiry).await,
                Err(e) => Err(e),
            };
            match written {
                Ok(()) => {
                    tracing::debug!(tier = %tier.tier(), key, bytes = payload.len(), "cached payload");
                    self.evict_before(index, key).await;
                    return;
                }
                Err(e) => tracing::warn!(tier = %tier.tier(), key, error = %e, "cache write failed"),
            }
        }
        self.log_dropped(key);
    }

    async fn evict_before(&self, index: usize, key: &str) {
        for tier in &self.tiers[..index] {
            if let Err(e) = tier.delete(key).await {
                tracing::warn!(tier = %tier.tier(), key, error = %e, "could not evict superseded entry");
            }
        }
    }

    fn log_dropped(&self, key: &str) {
        if self.is_enabled() {
            tracing::warn!(key, "could not persist to any cache tier; dropping write");
        }
    }
}
