//! Unified error types for resfetch.
//!
//! Every message starts with a stable uppercase code so callers and logs can
//! match on the failure class without parsing prose.

use tokio_rusqlite::rusqlite;

/// Unified error type shared by the cache, transport, and fetch layers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing URL or malformed options; raised before any fetch starts.
    #[error("CONFIG_ERROR: {0}")]
    Configuration(String),

    /// A candidate URL could not be canonicalized.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// A storage tier could not be opened, read, or written.
    #[error("STORAGE_UNAVAILABLE: {0}")]
    StorageUnavailable(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A single candidate failed at the network or HTTP level.
    #[error("NETWORK_FAILURE: {url}: {reason}")]
    NetworkFailure { url: String, reason: String },

    /// The caller's deadline elapsed before any candidate succeeded.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Response body exceeded the configured limit.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// The request was cancelled by the caller or by a competing candidate.
    #[error("CANCELLED")]
    Cancelled,

    /// Every candidate failed and nothing was cached to fall back on.
    #[error("ALL_CANDIDATES_FAILED: {attempts} attempt(s) failed, last error: {last}")]
    AllCandidatesFailed { attempts: usize, last: Box<Error> },

    /// Payload could not be decoded into the requested type.
    #[error("DECODE_ERROR: {0}")]
    Decode(String),
}

impl Error {
    /// Whether this error came from a storage tier rather than the network.
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::StorageUnavailable(_) | Error::Database(_) | Error::MigrationFailed(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::StorageUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NetworkFailure { url: "https://a.example/x".into(), reason: "status 503".into() };
        assert!(err.to_string().starts_with("NETWORK_FAILURE"));
        assert!(err.to_string().contains("status 503"));
    }

    #[test]
    fn test_all_candidates_failed_carries_last_error() {
        let err = Error::AllCandidatesFailed { attempts: 2, last: Box::new(Error::FetchTimeout("500ms".into())) };
        let msg = err.to_string();
        assert!(msg.contains("ALL_CANDIDATES_FAILED"));
        assert!(msg.contains("2 attempt(s)"));
        assert!(msg.contains("FETCH_TIMEOUT"));
    }

    #[test]
    fn test_storage_classification() {
        assert!(Error::StorageUnavailable("disk full".into()).is_storage());
        assert!(Error::MigrationFailed("bad".into()).is_storage());
        assert!(!Error::Cancelled.is_storage());
        assert!(!Error::Configuration("url".into()).is_storage());
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let err: Error = std::io::Error::other("read-only filesystem").into();
        assert!(matches!(err, Error::StorageUnavailable(msg) if msg.contains("read-only")));
    }
}
