//! File names for the flat cache tier.

use sha2::{Digest, Sha256};

/// Derive a filesystem-safe stem for a cache key.
///
/// URLs contain characters that are not valid in file names on every
/// platform, so the flat tier stores each key under its SHA-256 hex digest.
pub fn file_stem(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}
