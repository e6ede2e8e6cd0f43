//! HTTP transport implementation.
//!
//! This module provides an HTTP-based batch transport. The actual HTTP
//! client is abstracted via a trait so that any library (reqwest, hyper,
//! etc.) or an in-process loopback can carry the CBOR bodies.

use crate::error::{SyncError, SyncResult};
use crate::transport::BatchTransport;
use async_trait::async_trait;
use batchsync_protocol::{
    BatchAck, GetMoreChangesRequest, SendChangesRequest, SendChangesResponse, GET_CHANGES_PATH,
    SEND_CHANGES_PATH,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a POST request and returns the response body.
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

/// HTTP-based batch transport.
///
/// Uses CBOR encoding for request/response bodies.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the sync server (e.g., "https://sync.example.com").
    base_url: String,
    /// HTTP client implementation.
    client: C,
    /// Connection state.
    connected: AtomicBool,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    async fn post_cbor<Req, Res>(&self, endpoint: &str, request: &Req) -> SyncResult<Res>
    where
        Req: CborEncode + Sync,
        Res: CborDecode + Send,
    {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }

        let body = request
            .encode_cbor()
            .map_err(|e| SyncError::Codec(format!("failed to encode request: {e}")))?;

        let url = format!("{}{}", self.base_url, endpoint);
        debug!(%url, bytes = body.len(), "posting batch envelope");

        let response_body = match self.client.post(&url, body).await {
            Ok(bytes) => bytes,
            Err(e) => {
                // Only close() disconnects; a failed post may be retried.
                *self.last_error.write() = Some(e.clone());
                return Err(SyncError::transport_retryable(e));
            }
        };

        *self.last_error.write() = None;

        Res::decode_cbor(&response_body)
            .map_err(|e| SyncError::Codec(format!("failed to decode response: {e}")))
    }
}

#[async_trait]
impl<C: HttpClient> BatchTransport for HttpTransport<C> {
    async fn fetch_batch(&self, request: &GetMoreChangesRequest) -> SyncResult<SendChangesResponse> {
        self.post_cbor(GET_CHANGES_PATH, request).await
    }

    async fn send_batch(&self, request: &SendChangesRequest) -> SyncResult<BatchAck> {
        self.post_cbor(SEND_CHANGES_PATH, request).await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.client.is_healthy()
    }

    fn close(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Trait for CBOR encoding.
pub trait CborEncode {
    /// Encodes self to CBOR bytes.
    fn encode_cbor(&self) -> Result<Vec<u8>, String>;
}

/// Trait for CBOR decoding.
pub trait CborDecode: Sized {
    /// Decodes self from CBOR bytes.
    fn decode_cbor(bytes: &[u8]) -> Result<Self, String>;
}

impl CborEncode for GetMoreChangesRequest {
    fn encode_cbor(&self) -> Result<Vec<u8>, String> {
        self.encode().map_err(|e| e.to_string())
    }
}

impl CborEncode for SendChangesRequest {
    fn encode_cbor(&self) -> Result<Vec<u8>, String> {
        self.encode().map_err(|e| e.to_string())
    }
}

impl CborDecode for SendChangesResponse {
    fn decode_cbor(bytes: &[u8]) -> Result<Self, String> {
        Self::decode(bytes).map_err(|e| e.to_string())
    }
}

impl CborDecode for BatchAck {
    fn decode_cbor(bytes: &[u8]) -> Result<Self, String> {
        Self::decode(bytes).map_err(|e| e.to_string())
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer {
    /// Handles a POST request and returns the response.
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String>;
}

impl<F> LoopbackServer for F
where
    F: Fn(&str, &[u8]) -> Result<Vec<u8>, String>,
{
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        self(path, body)
    }
}

/// A loopback HTTP client that routes requests directly to a server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

#[async_trait]
impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String> {
        let path = url.find("/sync/").map(|i| &url[i..]).unwrap_or(url);
        self.server.handle_post(path, &body)
    }

    fn is_healthy(&self) -> bool {
        true
    }
}
