//! Request handlers for batch endpoints.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use batchsync_protocol::{
    BatchAck, BatchInfo, ContainerSet, DatabaseChangesApplied, GetMoreChangesRequest,
    SendChangesRequest, SendChangesResponse, SyncContext,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Server changes, already cut into download batches.
    batches: RwLock<Vec<ContainerSet>>,
    /// Upload progress per session, kept until `forget_session`.
    uploads: RwLock<HashMap<Uuid, UploadSession>>,
}

/// Upload progress of one client session.
#[derive(Debug, Clone, Default)]
struct UploadSession {
    /// Index of the next expected batch.
    next_index: u32,
    /// Rows received so far.
    received: ContainerSet,
    /// Rows applied so far.
    applied: DatabaseChangesApplied,
}

impl HandlerContext {
    /// Creates a new handler context with no server changes.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            batches: RwLock::new(vec![ContainerSet::new()]),
            uploads: RwLock::new(HashMap::new()),
        }
    }

    /// Replaces the server changes served to downloading clients.
    pub fn load_changes(&self, changes: ContainerSet) {
        let batches = match self.config.download_batch_rows {
            Some(rows) => changes.split(rows),
            None => vec![changes],
        };
        *self.batches.write() = batches;
    }

    /// Number of download batches currently served.
    pub fn batch_count(&self) -> usize {
        self.batches.read().len()
    }

    /// Rows uploaded by a session.
    pub fn received_changes(&self, session_id: &Uuid) -> Option<ContainerSet> {
        self.uploads
            .read()
            .get(session_id)
            .map(|s| s.received.clone())
    }

    /// Applied statistics for a session's upload.
    pub fn applied(&self, session_id: &Uuid) -> Option<DatabaseChangesApplied> {
        self.uploads.read().get(session_id).map(|s| s.applied.clone())
    }

    /// Drops everything recorded for a session.
    ///
    /// Returns false if the session was unknown.
    pub fn forget_session(&self, session_id: &Uuid) -> bool {
        self.uploads.write().remove(session_id).is_some()
    }

    /// Number of sessions with recorded uploads.
    pub fn session_count(&self) -> usize {
        self.uploads.read().len()
    }

    fn check_version(&self, context: &SyncContext) -> ServerResult<()> {
        if context.protocol_version != self.config.protocol_version {
            return Err(ServerError::ProtocolMismatch {
                server: self.config.protocol_version,
                client: context.protocol_version,
            });
        }
        Ok(())
    }
}

/// Handler for batch requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Serves one download batch.
    ///
    /// The applied statistics of the session's upload ride on batch 0 only,
    /// so a client summing every envelope counts them once.
    pub fn handle_get_changes(
        &self,
        request: GetMoreChangesRequest,
    ) -> ServerResult<SendChangesResponse> {
        self.context.check_version(&request.context)?;

        let batches = self.context.batches.read();
        let requested = request.batch_index_requested;
        let index = requested as usize;
        let changes = batches
            .get(index)
            .cloned()
            .ok_or(ServerError::BatchOutOfRange {
                requested,
                available: batches.len(),
            })?;
        let batch = BatchInfo::sequence(batches.len())
            .get(index)
            .copied()
            .unwrap_or_default();
        drop(batches);

        debug!(
            session_id = %request.context.session_id,
            batch_index = batch.batch_index,
            batch_count = batch.batch_count,
            rows = changes.rows_count(),
            "serving download batch"
        );

        let mut response = SendChangesResponse::new(
            request.context.clone(),
            batch,
            changes,
            self.context.config.remote_timestamp,
        );
        if index == 0 {
            if let Some(applied) = self.context.applied(&request.context.session_id) {
                response = response.with_client_changes_applied(applied);
            }
        }
        Ok(response)
    }

    /// Accepts one upload batch and acknowledges it.
    ///
    /// Batches of a session must arrive in index order; index 0 starts a
    /// fresh upload.
    pub fn handle_send_changes(&self, request: SendChangesRequest) -> ServerResult<BatchAck> {
        self.context.check_version(&request.context)?;
        request
            .batch
            .validate()
            .map_err(|e| ServerError::InvalidRequest(e.to_string()))?;

        let rows = request.changes.rows_count();
        if rows > self.context.config.max_upload_batch_rows {
            return Err(ServerError::InvalidRequest(format!(
                "batch of {rows} rows exceeds limit of {}",
                self.context.config.max_upload_batch_rows
            )));
        }

        let session_id = request.context.session_id;
        let index = request.batch.batch_index;
        let mut uploads = self.context.uploads.write();
        let session = uploads.entry(session_id).or_default();
        if index == 0 {
            *session = UploadSession::default();
        } else if index != session.next_index {
            return Err(ServerError::UploadOutOfOrder {
                expected: session.next_index,
                actual: index,
            });
        }

        for table in &request.changes.tables {
            session
                .applied
                .add_table(&table.table_name, table.rows.len() as u64, 0, 0);
        }
        session.received.merge(request.changes.clone());
        session.next_index = index + 1;

        if request.batch.ends_transfer() {
            info!(
                %session_id,
                rows = session.received.rows_count(),
                "upload complete"
            );
        }

        Ok(BatchAck::new(request.context, index, rows as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchsync_protocol::{SyncRow, Value};

    fn changes(rows: usize) -> ContainerSet {
        let mut set = ContainerSet::new();
        for i in 0..rows {
            set.add_row("Customer", SyncRow::modified(vec![Value::from(i as i64)]));
        }
        set
    }

    fn handler(config: ServerConfig) -> (Arc<HandlerContext>, RequestHandler) {
        let context = Arc::new(HandlerContext::new(config));
        let handler = RequestHandler::new(Arc::clone(&context));
        (context, handler)
    }

    #[test]
    fn unbatched_download_uses_single_envelope() {
        let (context, handler) = handler(ServerConfig::default());
        context.load_changes(changes(7));

        let ctx = SyncContext::new("Scope");
        let response = handler
            .handle_get_changes(GetMoreChangesRequest::new(ctx, 0))
            .unwrap();

        assert!(response.batch.is_single());
        assert_eq!(response.changes.rows_count(), 7);
        assert_eq!(response.server_changes_selected.total_changes_selected(), 7);
    }

    #[test]
    fn batched_download_splits_rows() {
        let (context, handler) = handler(ServerConfig::new().with_download_batch_rows(10));
        context.load_changes(changes(25));
        assert_eq!(context.batch_count(), 3);

        let ctx = SyncContext::new("Scope");
        let last = handler
            .handle_get_changes(GetMoreChangesRequest::new(ctx.clone(), 2))
            .unwrap();
        assert_eq!(last.batch, BatchInfo::part(2, 3));
        assert!(last.batch.is_last_batch);
        assert_eq!(last.changes.rows_count(), 5);

        let err = handler
            .handle_get_changes(GetMoreChangesRequest::new(ctx, 3))
            .unwrap_err();
        assert!(matches!(err, ServerError::BatchOutOfRange { requested: 3, .. }));
    }

    #[test]
    fn version_mismatch_rejected() {
        let (_context, handler) = handler(ServerConfig::default());
        let ctx = SyncContext::new("Scope").with_protocol_version(9);
        let err = handler
            .handle_get_changes(GetMoreChangesRequest::new(ctx, 0))
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::ProtocolMismatch {
                server: 1,
                client: 9
            }
        ));
    }

    #[test]
    fn upload_accumulates_in_order() {
        let (context, handler) = handler(ServerConfig::default());
        let ctx = SyncContext::new("Scope");

        let ack = handler
            .handle_send_changes(SendChangesRequest::new(
                ctx.clone(),
                BatchInfo::part(0, 2),
                changes(4),
            ))
            .unwrap();
        assert_eq!(ack.batch_index, 0);
        assert_eq!(ack.rows_received, 4);

        handler
            .handle_send_changes(SendChangesRequest::new(
                ctx.clone(),
                BatchInfo::part(1, 2),
                changes(3),
            ))
            .unwrap();

        let received = context.received_changes(&ctx.session_id).unwrap();
        assert_eq!(received.rows_count(), 7);
        let applied = context.applied(&ctx.session_id).unwrap();
        assert_eq!(applied.total_changes_applied(), 7);
    }

    #[test]
    fn upload_out_of_order_rejected() {
        let (_context, handler) = handler(ServerConfig::default());
        let ctx = SyncContext::new("Scope");

        let err = handler
            .handle_send_changes(SendChangesRequest::new(ctx, BatchInfo::part(1, 3), changes(1)))
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::UploadOutOfOrder {
                expected: 0,
                actual: 1
            }
        ));
    }

    #[test]
    fn oversized_upload_rejected() {
        let (_context, handler) =
            handler(ServerConfig::new().with_max_upload_batch_rows(2));
        let ctx = SyncContext::new("Scope");

        let err = handler
            .handle_send_changes(SendChangesRequest::new(ctx, BatchInfo::single(), changes(3)))
            .unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn forgotten_session_releases_uploads() {
        let (context, handler) = handler(ServerConfig::default());
        let ctx = SyncContext::new("Scope");
        handler
            .handle_send_changes(SendChangesRequest::new(
                ctx.clone(),
                BatchInfo::single(),
                changes(3),
            ))
            .unwrap();
        assert_eq!(context.session_count(), 1);

        assert!(context.forget_session(&ctx.session_id));
        assert_eq!(context.session_count(), 0);
        assert!(context.received_changes(&ctx.session_id).is_none());
        assert!(!context.forget_session(&ctx.session_id));
    }

    #[test]
    fn applied_stats_only_on_first_batch() {
        let (context, handler) = handler(ServerConfig::new().with_download_batch_rows(2));
        context.load_changes(changes(4));
        let ctx = SyncContext::new("Scope");

        handler
            .handle_send_changes(SendChangesRequest::new(
                ctx.clone(),
                BatchInfo::single(),
                changes(5),
            ))
            .unwrap();

        let first = handler
            .handle_get_changes(GetMoreChangesRequest::new(ctx.clone(), 0))
            .unwrap();
        let second = handler
            .handle_get_changes(GetMoreChangesRequest::new(ctx, 1))
            .unwrap();

        assert_eq!(first.client_changes_applied.total_changes_applied(), 5);
        assert_eq!(second.client_changes_applied.total_changes_applied(), 0);
    }
}
