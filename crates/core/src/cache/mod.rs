//! Two-tier persistent cache for fetched payloads.
//!
//! Entries are keyed by canonical URL and hold the raw payload bytes plus an
//! expiry timestamp. Two interchangeable backends implement
//! [`KeyValueStore`]:
//!
//! - [`CacheDb`]: SQLite through tokio-rusqlite, WAL mode, versioned migrations
//! - [`FlatStore`]: one file per key in a directory, written synchronously
//!
//! [`PersistentStore`] selects the available tiers once at startup and hides
//! per-operation failures from callers. Caching is best effort: storage
//! errors are logged, never returned.

pub mod connection;
pub mod entries;
pub mod expiry;
pub mod flat;
pub mod hash;
pub mod migrations;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use expiry::CacheEntry;
pub use flat::FlatStore;
pub use store::{KeyValueStore, PersistentStore, Tier};
