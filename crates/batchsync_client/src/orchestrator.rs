//! Batch transfer orchestrator.
//!
//! Drives one directional transfer as a strictly sequential series of
//! batch envelopes. Each step is: notify observers, exchange one envelope,
//! validate it, fold it into the running container and statistics. The
//! next request is only built once the previous exchange and every
//! observer of it have completed.

use crate::config::ClientConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{
    GettingChangesRequestArgs, GettingChangesResponseArgs, ProgressEvent,
    SendingChangesRequestArgs, SyncEventKind,
};
use crate::interceptors::Interceptors;
use crate::transport::BatchTransport;
use batchsync_protocol::{
    BatchAck, BatchInfo, ContainerSet, DatabaseChangesApplied, DatabaseChangesSelected,
    GetMoreChangesRequest, SendChangesRequest, SendChangesResponse, SyncContext,
};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Outcome of a completed download.
#[derive(Debug, Clone)]
pub struct DownloadResult {
    /// Rows of every batch, merged in batch order.
    pub changes: ContainerSet,
    /// Server selection statistics summed over all batches.
    pub server_changes_selected: DatabaseChangesSelected,
    /// Applied statistics summed over all batches.
    pub client_changes_applied: DatabaseChangesApplied,
    /// Server timestamp of the last batch; the caller's next watermark.
    pub remote_client_timestamp: i64,
    /// Number of envelopes received.
    pub batches_received: u32,
}

/// Outcome of a completed upload.
#[derive(Debug, Clone)]
pub struct UploadConfirmation {
    /// Number of envelopes sent.
    pub batches_sent: u32,
    /// Rows sent across all envelopes.
    pub rows_sent: u64,
    /// Server acknowledgments, in batch order.
    pub acks: Vec<BatchAck>,
}

impl UploadConfirmation {
    /// Acknowledgment of the final envelope.
    pub fn last_ack(&self) -> Option<&BatchAck> {
        self.acks.last()
    }
}

/// Outcome of an upload followed by a download.
#[derive(Debug, Clone)]
pub struct ExchangeResult {
    /// Upload half.
    pub upload: UploadConfirmation,
    /// Download half.
    pub download: DownloadResult,
}

/// Drives batched uploads and downloads against one remote host.
pub struct BatchOrchestrator<T: BatchTransport> {
    config: ClientConfig,
    transport: Arc<T>,
    interceptors: Interceptors,
}

impl<T: BatchTransport> BatchOrchestrator<T> {
    /// Creates a new orchestrator.
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self::with_shared_transport(config, Arc::new(transport))
    }

    /// Creates an orchestrator over a transport shared with the caller.
    pub fn with_shared_transport(config: ClientConfig, transport: Arc<T>) -> Self {
        Self {
            config,
            transport,
            interceptors: Interceptors::new(),
        }
    }

    /// Gets the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Gets the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Gets the observer registry.
    pub fn interceptors(&self) -> &Interceptors {
        &self.interceptors
    }

    /// Creates a session context using the configured protocol version.
    pub fn new_context(&self, scope_name: impl Into<String>) -> SyncContext {
        SyncContext::new(scope_name).with_protocol_version(self.config.protocol_version)
    }

    /// Downloads every batch of server changes.
    ///
    /// Batches are requested in index order starting at 0 until one is
    /// flagged last or the transfer turns out to be unbatched
    /// (`batch_count <= 1`). Any transport failure or protocol violation
    /// aborts the download and nothing accumulated so far is returned.
    #[instrument(skip_all, fields(session_id = %context.session_id, host = %self.config.host))]
    pub async fn download_changes(&self, context: &SyncContext) -> SyncResult<DownloadResult> {
        let host = self.config.host.as_str();
        let mut changes = ContainerSet::new();
        let mut server_changes_selected = DatabaseChangesSelected::new();
        let mut client_changes_applied = DatabaseChangesApplied::new();
        let mut remote_client_timestamp: i64;

        let mut next_index = 0u32;
        let mut last_index_received = -1i64;
        let mut batch_count = 0u32;
        let mut batches_received = 0u32;

        loop {
            self.notify(SyncEventKind::HttpGettingChangesRequest, || {
                ProgressEvent::GettingChangesRequest(GettingChangesRequestArgs::new(
                    context.clone(),
                    next_index,
                    last_index_received,
                    batch_count,
                    host,
                ))
            })
            .await;

            let request = GetMoreChangesRequest::new(context.clone(), next_index);
            let response = self.exchange(self.transport.fetch_batch(&request)).await?;

            let expected_count = (batches_received > 0).then_some(batch_count);
            check_response(context, &response, next_index, expected_count)?;

            let batch = response.batch;
            debug!(
                batch_index = batch.batch_index,
                batch_count = batch.batch_count,
                rows = response.changes.rows_count(),
                "received batch"
            );

            remote_client_timestamp = response.remote_client_timestamp;
            server_changes_selected.merge(&response.server_changes_selected);
            client_changes_applied.merge(&response.client_changes_applied);

            self.notify(SyncEventKind::HttpGettingChangesResponse, || {
                ProgressEvent::GettingChangesResponse(GettingChangesResponseArgs::new(
                    response.clone(),
                    server_changes_selected.clone(),
                    host,
                ))
            })
            .await;

            changes.merge(response.changes);
            last_index_received = i64::from(batch.batch_index);
            batch_count = batch.batch_count;
            batches_received += 1;

            if batch.ends_transfer() {
                break;
            }
            next_index = batch.batch_index + 1;
        }

        info!(
            batches = batches_received,
            rows = changes.rows_count(),
            total_selected = server_changes_selected.total_changes_selected(),
            "download complete"
        );

        Ok(DownloadResult {
            changes,
            server_changes_selected,
            client_changes_applied,
            remote_client_timestamp,
            batches_received,
        })
    }

    /// Uploads `changes`, split by the configured batch size.
    ///
    /// A container that fits in one batch (or an unset batch size) goes
    /// out as a single unbatched envelope. The first failure aborts the
    /// upload; batches already acknowledged are not rolled back here.
    #[instrument(skip_all, fields(session_id = %context.session_id, host = %self.config.host))]
    pub async fn upload_changes(
        &self,
        context: &SyncContext,
        changes: &ContainerSet,
    ) -> SyncResult<UploadConfirmation> {
        let host = self.config.host.as_str();
        let chunks = match self.config.upload_batch_rows {
            Some(max_rows) => changes.split(max_rows),
            None => vec![changes.clone()],
        };
        let batches = BatchInfo::sequence(chunks.len());
        let total_rows = changes.rows_count();

        let mut confirmation = UploadConfirmation {
            batches_sent: 0,
            rows_sent: 0,
            acks: Vec::with_capacity(batches.len()),
        };

        for (batch, chunk) in batches.into_iter().zip(chunks) {
            let rows_in_batch = chunk.rows_count();
            let request = SendChangesRequest::new(context.clone(), batch, chunk);

            self.notify(SyncEventKind::HttpSendingChangesRequest, || {
                ProgressEvent::SendingChangesRequest(SendingChangesRequestArgs::new(
                    request.clone(),
                    rows_in_batch,
                    total_rows,
                    host,
                ))
            })
            .await;

            let ack = self.exchange(self.transport.send_batch(&request)).await?;
            if ack.batch_index != batch.batch_index {
                return Err(SyncError::AckMismatch {
                    sent: batch.batch_index,
                    acknowledged: ack.batch_index,
                });
            }
            debug!(
                batch_index = batch.batch_index,
                batch_count = batch.batch_count,
                rows = rows_in_batch,
                rows_received = ack.rows_received,
                "batch acknowledged"
            );

            confirmation.batches_sent += 1;
            confirmation.rows_sent += rows_in_batch as u64;
            confirmation.acks.push(ack);
        }

        info!(
            batches = confirmation.batches_sent,
            rows = confirmation.rows_sent,
            "upload complete"
        );
        Ok(confirmation)
    }

    /// Uploads local changes, then downloads server changes.
    pub async fn exchange_changes(
        &self,
        context: &SyncContext,
        local_changes: &ContainerSet,
    ) -> SyncResult<ExchangeResult> {
        let upload = self.upload_changes(context, local_changes).await?;
        let download = self.download_changes(context).await?;
        Ok(ExchangeResult { upload, download })
    }

    async fn notify<F>(&self, kind: SyncEventKind, build: F)
    where
        F: FnOnce() -> ProgressEvent,
    {
        if self.interceptors.has_observers(kind) {
            self.interceptors.dispatch(build()).await;
        }
    }

    async fn exchange<F, R>(&self, exchange: F) -> SyncResult<R>
    where
        F: Future<Output = SyncResult<R>>,
    {
        match tokio::time::timeout(self.config.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout),
        }
    }
}

/// Checks a download envelope against the batch the client asked for.
fn check_response(
    context: &SyncContext,
    response: &SendChangesResponse,
    requested: u32,
    expected_count: Option<u32>,
) -> SyncResult<()> {
    if response.context.protocol_version != context.protocol_version {
        return Err(SyncError::VersionMismatch {
            local: context.protocol_version,
            remote: response.context.protocol_version,
        });
    }
    if response.batch.batch_index != requested {
        return Err(SyncError::BatchOutOfOrder {
            requested,
            received: response.batch.batch_index,
        });
    }
    response.batch.validate()?;
    if let Some(expected) = expected_count {
        if response.batch.batch_count != expected {
            return Err(SyncError::BatchCountChanged {
                expected,
                received: response.batch.batch_count,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ScriptedTransport;
    use batchsync_protocol::{ProtocolError, SyncRow, Value};
    use parking_lot::Mutex;
    use std::time::Duration;

    fn rows(table: &str, count: usize) -> ContainerSet {
        let mut set = ContainerSet::new();
        for n in 0..count {
            set.add_row(table, SyncRow::modified(vec![Value::Integer((n as i64).into())]));
        }
        set
    }

    fn batch(ctx: &SyncContext, info: BatchInfo, count: usize) -> SendChangesResponse {
        SendChangesResponse::new(ctx.clone(), info, rows("customer", count), 1000 + i64::from(info.batch_index))
    }

    fn orchestrator() -> BatchOrchestrator<ScriptedTransport> {
        BatchOrchestrator::new(ClientConfig::new("https://sync.example.com"), ScriptedTransport::new())
    }

    #[tokio::test]
    async fn download_merges_batches() {
        let engine = orchestrator();
        let ctx = engine.new_context("sales");
        engine.transport().script_downloads(vec![
            batch(&ctx, BatchInfo::part(0, 2), 4),
            batch(&ctx, BatchInfo::part(1, 2), 3),
        ]);

        let result = engine.download_changes(&ctx).await.unwrap();
        assert_eq!(result.batches_received, 2);
        assert_eq!(result.changes.rows_count(), 7);
        assert_eq!(result.server_changes_selected.total_changes_selected(), 7);
        assert_eq!(result.remote_client_timestamp, 1001);

        let indexes: Vec<u32> = engine
            .transport()
            .fetch_requests()
            .iter()
            .map(|r| r.batch_index_requested)
            .collect();
        assert_eq!(indexes, vec![0, 1]);
    }

    #[tokio::test]
    async fn download_stops_on_single_batch_without_last_flag() {
        let engine = orchestrator();
        let ctx = engine.new_context("sales");
        let mut response = batch(&ctx, BatchInfo::single(), 2);
        response.batch.is_last_batch = false;
        engine.transport().script_downloads(vec![response]);

        let result = engine.download_changes(&ctx).await.unwrap();
        assert_eq!(result.batches_received, 1);
        assert_eq!(engine.transport().fetch_requests().len(), 1);
    }

    #[tokio::test]
    async fn out_of_order_batch_is_protocol_violation() {
        let engine = orchestrator();
        let ctx = engine.new_context("sales");
        engine.transport().script_downloads(vec![
            batch(&ctx, BatchInfo::part(0, 3), 1),
            batch(&ctx, BatchInfo::part(2, 3), 1),
        ]);

        let err = engine.download_changes(&ctx).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::BatchOutOfOrder {
                requested: 1,
                received: 2
            }
        ));
        assert!(err.is_protocol());
    }

    #[tokio::test]
    async fn duplicate_batch_is_protocol_violation() {
        let engine = orchestrator();
        let ctx = engine.new_context("sales");
        engine.transport().script_downloads(vec![
            batch(&ctx, BatchInfo::part(0, 3), 1),
            batch(&ctx, BatchInfo::part(0, 3), 1),
        ]);

        let err = engine.download_changes(&ctx).await.unwrap_err();
        assert!(matches!(err, SyncError::BatchOutOfOrder { requested: 1, received: 0 }));
    }

    #[tokio::test]
    async fn early_last_flag_is_protocol_violation() {
        let engine = orchestrator();
        let ctx = engine.new_context("sales");
        let mut early = batch(&ctx, BatchInfo::part(0, 3), 1);
        early.batch.is_last_batch = true;
        engine.transport().script_downloads(vec![early]);

        let err = engine.download_changes(&ctx).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::InvalidBatch(ProtocolError::InvalidBatchInfo { .. })
        ));
    }

    #[tokio::test]
    async fn changing_batch_count_is_protocol_violation() {
        let engine = orchestrator();
        let ctx = engine.new_context("sales");
        engine.transport().script_downloads(vec![
            batch(&ctx, BatchInfo::part(0, 3), 1),
            batch(&ctx, BatchInfo::part(1, 4), 1),
        ]);

        let err = engine.download_changes(&ctx).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::BatchCountChanged {
                expected: 3,
                received: 4
            }
        ));
    }

    #[tokio::test]
    async fn protocol_version_mismatch() {
        let engine = orchestrator();
        let ctx = engine.new_context("sales");
        let mut response = batch(&ctx, BatchInfo::single(), 1);
        response.context.protocol_version = 9;
        engine.transport().script_downloads(vec![response]);

        let err = engine.download_changes(&ctx).await.unwrap_err();
        assert!(matches!(err, SyncError::VersionMismatch { local: 1, remote: 9 }));
    }

    #[tokio::test]
    async fn slow_exchange_times_out() {
        let engine = BatchOrchestrator::new(
            ClientConfig::new("h").with_timeout(Duration::from_millis(10)),
            ScriptedTransport::new(),
        );
        let ctx = engine.new_context("sales");
        engine.transport().set_latency(Duration::from_millis(200));
        engine
            .transport()
            .script_downloads(vec![batch(&ctx, BatchInfo::single(), 1)]);

        let err = engine.download_changes(&ctx).await.unwrap_err();
        assert!(matches!(err, SyncError::Timeout));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn upload_unbatched_by_default() {
        let engine = orchestrator();
        let ctx = engine.new_context("sales");

        let confirmation = engine.upload_changes(&ctx, &rows("orders", 12)).await.unwrap();
        assert_eq!(confirmation.batches_sent, 1);
        assert_eq!(confirmation.rows_sent, 12);

        let sent = engine.transport().sent_batches();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].batch.is_single());
    }

    #[tokio::test]
    async fn upload_splits_by_batch_rows() {
        let engine = BatchOrchestrator::new(
            ClientConfig::new("h").with_upload_batch_rows(5),
            ScriptedTransport::new(),
        );
        let ctx = engine.new_context("sales");
        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&messages);
        engine
            .interceptors()
            .on_http_sending_changes_request(move |args| {
                sink.lock().push((args.rows_count(), args.total_rows_count(), args.request().batch));
            });

        let confirmation = engine.upload_changes(&ctx, &rows("orders", 12)).await.unwrap();
        assert_eq!(confirmation.batches_sent, 3);
        assert_eq!(confirmation.rows_sent, 12);
        assert_eq!(confirmation.last_ack().map(|a| a.batch_index), Some(2));

        let seen = messages.lock().clone();
        assert_eq!(
            seen,
            vec![
                (5, 12, BatchInfo::part(0, 3)),
                (5, 12, BatchInfo::part(1, 3)),
                (2, 12, BatchInfo::part(2, 3)),
            ]
        );
    }

    #[tokio::test]
    async fn upload_stops_after_failed_batch() {
        let engine = BatchOrchestrator::new(
            ClientConfig::new("h").with_upload_batch_rows(2),
            ScriptedTransport::new(),
        );
        let ctx = engine.new_context("sales");
        engine
            .transport()
            .push_send_outcome(Ok(BatchAck::new(ctx.clone(), 0, 2)));
        engine
            .transport()
            .push_send_outcome(Err(SyncError::transport_retryable("connection reset")));

        let err = engine.upload_changes(&ctx, &rows("orders", 6)).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(engine.transport().sent_batches().len(), 2);
    }

    #[tokio::test]
    async fn upload_ack_mismatch() {
        let engine = orchestrator();
        let ctx = engine.new_context("sales");
        engine
            .transport()
            .push_send_outcome(Ok(BatchAck::new(ctx.clone(), 4, 1)));

        let err = engine.upload_changes(&ctx, &rows("orders", 1)).await.unwrap_err();
        assert!(matches!(err, SyncError::AckMismatch { sent: 0, acknowledged: 4 }));
    }

    #[tokio::test]
    async fn empty_upload_still_sends_one_envelope() {
        let engine = orchestrator();
        let ctx = engine.new_context("sales");

        let confirmation = engine.upload_changes(&ctx, &ContainerSet::new()).await.unwrap();
        assert_eq!(confirmation.batches_sent, 1);
        assert_eq!(confirmation.rows_sent, 0);
    }

    #[tokio::test]
    async fn exchange_uploads_then_downloads() {
        let engine = orchestrator();
        let ctx = engine.new_context("sales");
        engine
            .transport()
            .script_downloads(vec![batch(&ctx, BatchInfo::single(), 3)]);

        let result = engine.exchange_changes(&ctx, &rows("orders", 2)).await.unwrap();
        assert_eq!(result.upload.rows_sent, 2);
        assert_eq!(result.download.changes.rows_count(), 3);
    }
}
