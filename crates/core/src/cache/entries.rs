//! Entry CRUD operations for the SQLite tier.
//!
//! Payload and expiry live in separate nullable columns of one row so each
//! can be written independently, matching the [`KeyValueStore`] contract.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::OptionalExtension;

use super::connection::CacheDb;
use super::expiry::{from_millis, to_millis};
use super::store::{KeyValueStore, Tier};
use crate::Error;

fn updated_at() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl CacheDb {
    /// Insert or replace the payload for `key`, keeping any stored expiry.
    pub async fn upsert_payload(&self, key: &str, payload: &[u8]) -> Result<(), Error> {
        let key = key.to_string();
        let payload = payload.to_vec();
        let updated_at = updated_at();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO entries (key, payload, updated_at) VALUES (?1, ?2, ?3)
                    ON CONFLICT(key) DO UPDATE SET
                        payload = excluded.payload,
                        updated_at = excluded.updated_at",
                    params![key, payload, updated_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace the expiry for `key`, keeping any stored payload.
    pub async fn upsert_expiry(&self, key: &str, expiry: DateTime<Utc>) -> Result<(), Error> {
        let key = key.to_string();
        let expires_at = to_millis(expiry);
        let updated_at = updated_at();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO entries (key, expires_at, updated_at) VALUES (?1, ?2, ?3)
                    ON CONFLICT(key) DO UPDATE SET
                        expires_at = excluded.expires_at,
                        updated_at = excluded.updated_at",
                    params![key, expires_at, updated_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get the payload for `key`, or None if absent.
    pub async fn get_payload(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Vec<u8>>, Error> {
                let payload: Option<Option<Vec<u8>>> = conn
                    .query_row("SELECT payload FROM entries WHERE key = ?1", params![key], |row| row.get(0))
                    .optional()?;
                Ok(payload.flatten())
            })
            .await
            .map_err(Error::from)
    }

    /// Get the expiry for `key`, or None if absent.
    pub async fn get_expiry_millis(&self, key: &str) -> Result<Option<i64>, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<i64>, Error> {
                let expires_at: Option<Option<i64>> = conn
                    .query_row("SELECT expires_at FROM entries WHERE key = ?1", params![key], |row| row.get(0))
                    .optional()?;
                Ok(expires_at.flatten())
            })
            .await
            .map_err(Error::from)
    }

    /// Delete one entry.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_key(&self, key: &str) -> Result<u64, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM entries WHERE key = ?1", params![key])?;
                Ok(u64::try_from(count).unwrap_or(u64::MAX))
            })
            .await
            .map_err(Error::from)
    }

    /// Purge least recently written entries until count <= max_entries.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_lru(&self, max_entries: usize) -> Result<u64, Error> {
        let max = i64::try_from(max_entries).unwrap_or(i64::MAX);
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
                if count <= max {
                    return Ok(0);
                }

                let to_delete = count - max;
                let deleted = conn.execute(
                    "DELETE FROM entries WHERE key IN (
                    SELECT key FROM entries ORDER BY updated_at ASC LIMIT ?1
                )",
                    params![to_delete],
                )?;
                Ok(u64::try_from(deleted).unwrap_or(u64::MAX))
            })
            .await
            .map_err(Error::from)
    }

    /// Number of stored entries.
    pub async fn count(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
                Ok(u64::try_from(count).unwrap_or(0))
            })
            .await
            .map_err(Error::from)
    }
}

#[async_trait]
impl KeyValueStore for CacheDb {
    fn tier(&self) -> Tier {
        Tier::Structured
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
        Ok(self.get_payload(key).await?.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<(), Error> {
        self.upsert_payload(key, &value).await
    }

    async fn get_expiry(&self, key: &str) -> Result<Option<DateTime<Utc>>, Error> {
        Ok(self.get_expiry_millis(key).await?.map(from_millis))
    }

    async fn set_expiry(&self, key: &str, expiry: DateTime<Utc>) -> Result<(), Error> {
        self.upsert_expiry(key, expiry).await
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.purge_key(key).await.map(|_| ())
    }
}
