//! Scripted transport for coordinator and API tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{StatusCode, Url, header::HeaderMap};
use tokio_util::sync::CancellationToken;

use crate::fetch::{CredentialsPolicy, Transport, TransportRequest, TransportResponse};
use resfetch_core::Error;

/// What a scripted URL does when requested.
#[derive(Debug, Clone)]
pub enum Reply {
    Body { delay_ms: u64, body: &'static [u8] },
    NoChange { delay_ms: u64 },
    Fail { delay_ms: u64 },
    Hang,
}

/// One observed request.
#[derive(Debug, Clone)]
pub struct Call {
    pub url: String,
    pub headers: HeaderMap,
    pub credentials: CredentialsPolicy,
}

#[derive(Debug, Default)]
pub struct MockTransport {
    replies: HashMap<String, Reply>,
    calls: Mutex<Vec<Call>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, url: &str, reply: Reply) -> Self {
        self.replies.insert(url.to_string(), reply);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn respond(url: &Url, status: StatusCode, body: &'static [u8]) -> TransportResponse {
        TransportResponse {
            url: url.clone(),
            final_url: url.clone(),
            status,
            bytes: Bytes::from_static(body),
            fetch_ms: 0,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&self, request: TransportRequest, cancel: CancellationToken) -> Result<TransportResponse, Error> {
        self.calls.lock().unwrap().push(Call {
            url: request.url.to_string(),
            headers: request.headers.clone(),
            credentials: request.credentials,
        });

        let reply = self
            .replies
            .get(request.url.as_str())
            .cloned()
            .unwrap_or(Reply::Fail { delay_ms: 0 });

        let delay = match &reply {
            Reply::Body { delay_ms, .. } | Reply::NoChange { delay_ms } | Reply::Fail { delay_ms } => {
                Duration::from_millis(*delay_ms)
            }
            Reply::Hang => Duration::from_secs(3600),
        };

        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }

        match reply {
            Reply::Body { body, .. } => Ok(Self::respond(&request.url, StatusCode::OK, body)),
            Reply::NoChange { .. } => Ok(Self::respond(&request.url, StatusCode::NO_CONTENT, b"")),
            Reply::Fail { .. } | Reply::Hang => {
                Err(Error::NetworkFailure { url: request.url.to_string(), reason: "status 503".into() })
            }
        }
    }
}
