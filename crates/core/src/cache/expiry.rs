//! Freshness window for cached entries.
//!
//! An entry is fresh while its expiry lies strictly in the future. Entries
//! written with a zero lifetime are stale immediately but stay in the store,
//! where they serve as a fallback when every candidate fails.

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};

/// True iff `expiry` lies strictly after `now`.
pub fn is_valid(expiry: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expiry > now
}

/// `now + lifetime`, saturating at the latest representable instant.
pub fn compute_expiry(now: DateTime<Utc>, lifetime: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(lifetime)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Encode an expiry for storage as Unix milliseconds.
pub(crate) fn to_millis(expiry: DateTime<Utc>) -> i64 {
    expiry.timestamp_millis()
}

/// Decode a stored expiry. Out-of-range values read as already expired.
pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// A cached payload together with its freshness deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Canonical URL of the primary candidate.
    pub key: String,
    pub payload: Bytes,
    pub expiry: DateTime<Utc>,
}

impl CacheEntry {
    /// Whether this entry may be served without contacting the network.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        is_valid(self.expiry, now)
    }
}
