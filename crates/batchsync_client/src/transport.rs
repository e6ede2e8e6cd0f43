//! Transport layer abstraction for batched transfers.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use batchsync_protocol::{BatchAck, GetMoreChangesRequest, SendChangesRequest, SendChangesResponse};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A batch transport moves one envelope at a time to or from the server.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, loopback, scripted for testing, etc.). Failures
/// must be reported with the transport family of [`SyncError`] so the
/// orchestrator can keep them apart from protocol violations.
#[async_trait]
pub trait BatchTransport: Send + Sync {
    /// Fetches one batch of server changes.
    async fn fetch_batch(&self, request: &GetMoreChangesRequest) -> SyncResult<SendChangesResponse>;

    /// Sends one batch of client changes.
    async fn send_batch(&self, request: &SendChangesRequest) -> SyncResult<BatchAck>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;

    /// Closes the transport connection.
    fn close(&self) -> SyncResult<()>;
}

/// A scripted transport for testing.
///
/// Download batches are served from a queue in the order they were
/// scripted. Uploads are acknowledged automatically unless an explicit
/// outcome was queued. Every request is recorded.
#[derive(Debug)]
pub struct ScriptedTransport {
    connected: AtomicBool,
    latency: Mutex<Option<Duration>>,
    downloads: Mutex<VecDeque<SyncResult<SendChangesResponse>>>,
    send_outcomes: Mutex<VecDeque<SyncResult<BatchAck>>>,
    fetch_requests: Mutex<Vec<GetMoreChangesRequest>>,
    sent: Mutex<Vec<SendChangesRequest>>,
}

impl ScriptedTransport {
    /// Creates a connected transport with nothing scripted.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            latency: Mutex::new(None),
            downloads: Mutex::new(VecDeque::new()),
            send_outcomes: Mutex::new(VecDeque::new()),
            fetch_requests: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Queues download batches, served in order.
    pub fn script_downloads(&self, responses: impl IntoIterator<Item = SendChangesResponse>) {
        self.downloads
            .lock()
            .extend(responses.into_iter().map(Ok));
    }

    /// Queues a failing download exchange.
    pub fn push_download_failure(&self, error: SyncError) {
        self.downloads.lock().push_back(Err(error));
    }

    /// Queues an explicit outcome for the next upload exchange.
    pub fn push_send_outcome(&self, outcome: SyncResult<BatchAck>) {
        self.send_outcomes.lock().push_back(outcome);
    }

    /// Delays every exchange by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Download requests received so far.
    pub fn fetch_requests(&self) -> Vec<GetMoreChangesRequest> {
        self.fetch_requests.lock().clone()
    }

    /// Upload envelopes received so far.
    pub fn sent_batches(&self) -> Vec<SendChangesRequest> {
        self.sent.lock().clone()
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BatchTransport for ScriptedTransport {
    async fn fetch_batch(&self, request: &GetMoreChangesRequest) -> SyncResult<SendChangesResponse> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        self.fetch_requests.lock().push(request.clone());
        self.simulate_latency().await;

        let next = self.downloads.lock().pop_front();
        next.unwrap_or_else(|| Err(SyncError::transport_fatal("no scripted download batch")))
    }

    async fn send_batch(&self, request: &SendChangesRequest) -> SyncResult<BatchAck> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        self.sent.lock().push(request.clone());
        self.simulate_latency().await;

        let scripted = self.send_outcomes.lock().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(BatchAck::new(
                request.context.clone(),
                request.batch.batch_index,
                request.changes.rows_count() as u64,
            ))
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchsync_protocol::{BatchInfo, ContainerSet, SyncContext};

    #[test]
    fn scripted_transport_connection() {
        let transport = ScriptedTransport::new();
        assert!(transport.is_connected());

        transport.set_connected(false);
        assert!(!transport.is_connected());

        transport.set_connected(true);
        transport.close().unwrap();
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn not_connected_error() {
        let transport = ScriptedTransport::new();
        transport.close().unwrap();

        let request = GetMoreChangesRequest::new(SyncContext::default(), 0);
        let result = transport.fetch_batch(&request).await;
        assert!(matches!(result, Err(SyncError::NotConnected)));
        assert!(transport.fetch_requests().is_empty());
    }

    #[tokio::test]
    async fn downloads_served_in_order() {
        let transport = ScriptedTransport::new();
        let ctx = SyncContext::default();
        transport.script_downloads(vec![
            SendChangesResponse::new(ctx.clone(), BatchInfo::part(0, 2), ContainerSet::new(), 1),
            SendChangesResponse::new(ctx.clone(), BatchInfo::part(1, 2), ContainerSet::new(), 2),
        ]);

        let first = transport
            .fetch_batch(&GetMoreChangesRequest::new(ctx.clone(), 0))
            .await
            .unwrap();
        let second = transport
            .fetch_batch(&GetMoreChangesRequest::new(ctx.clone(), 1))
            .await
            .unwrap();
        assert_eq!(first.remote_client_timestamp, 1);
        assert_eq!(second.remote_client_timestamp, 2);

        let exhausted = transport.fetch_batch(&GetMoreChangesRequest::new(ctx, 2)).await;
        assert!(matches!(exhausted, Err(SyncError::Transport { retryable: false, .. })));
        assert_eq!(transport.fetch_requests().len(), 3);
    }

    #[tokio::test]
    async fn uploads_acknowledged_by_default() {
        let transport = ScriptedTransport::new();
        let request = SendChangesRequest::new(SyncContext::default(), BatchInfo::part(1, 3), ContainerSet::new());

        let ack = transport.send_batch(&request).await.unwrap();
        assert_eq!(ack.batch_index, 1);
        assert_eq!(ack.rows_received, 0);
        assert_eq!(transport.sent_batches().len(), 1);
    }
}
