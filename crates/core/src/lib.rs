//! Core types and shared functionality for resfetch.
//!
//! This crate provides:
//! - Two-tier persistent cache (SQLite with a flat-file fallback)
//! - Expiry and checksum helpers used by the request coordinator
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod checksum;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CacheEntry, FlatStore, KeyValueStore, PersistentStore};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
