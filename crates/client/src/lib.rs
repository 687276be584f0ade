//! Client side of resfetch.
//!
//! This crate provides the HTTP transport, URL canonicalization, the request
//! coordinator that races candidate URLs against the persistent cache, and
//! the public [`CachedFetcher`] entry point.

pub mod api;
pub mod coordinator;
pub mod fetch;

#[cfg(test)]
mod testing;

pub use api::{CachedFetcher, GetOptions};
pub use coordinator::{FetchOutcome, FetchRequest, RequestCoordinator, Resolved, Source, Timeout};
pub use fetch::{
    CredentialsPolicy, FetchConfig, ReqwestTransport, Transport, TransportRequest, TransportResponse, TrustedOrigins,
};
