//! Main batch server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use batchsync_protocol::{
    BatchAck, ContainerSet, DatabaseChangesApplied, GetMoreChangesRequest, SendChangesRequest,
    SendChangesResponse, SyncMessage, GET_CHANGES_PATH, SEND_CHANGES_PATH,
};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// The batch server.
///
/// Serves a loaded change set as a sequence of download batches and
/// collects uploaded batches per session.
///
/// # Example
///
/// ```
/// use batchsync_server::{BatchServer, ServerConfig};
/// use batchsync_protocol::ContainerSet;
///
/// let server = BatchServer::new(ServerConfig::new().with_download_batch_rows(100));
/// server.load_changes(ContainerSet::new());
///
/// // Expose `handle_post` behind real HTTP routes, or hand it to a
/// // loopback client in tests.
/// ```
pub struct BatchServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl BatchServer {
    /// Creates a new batch server with no server changes.
    pub fn new(config: ServerConfig) -> Self {
        let context = Arc::new(HandlerContext::new(config));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Replaces the changes served to downloading clients.
    pub fn load_changes(&self, changes: ContainerSet) {
        self.context.load_changes(changes);
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Number of download batches currently served.
    pub fn batch_count(&self) -> usize {
        self.context.batch_count()
    }

    /// Handles a download request.
    pub fn handle_get_changes(
        &self,
        request: GetMoreChangesRequest,
    ) -> ServerResult<SendChangesResponse> {
        self.handler.handle_get_changes(request)
    }

    /// Handles an upload batch.
    pub fn handle_send_changes(&self, request: SendChangesRequest) -> ServerResult<BatchAck> {
        self.handler.handle_send_changes(request)
    }

    /// Handles a sync message (dispatches to appropriate handler).
    pub fn handle_message(&self, message: SyncMessage) -> ServerResult<SyncMessage> {
        match message {
            SyncMessage::GetMoreChangesRequest(req) => self
                .handle_get_changes(req)
                .map(SyncMessage::SendChangesResponse),
            SyncMessage::SendChangesRequest(req) => {
                self.handle_send_changes(req).map(SyncMessage::BatchAck)
            }
            other => Err(ServerError::InvalidRequest(format!(
                "unexpected message type {}",
                other.type_code()
            ))),
        }
    }

    /// Handles a CBOR request body posted to `path`.
    ///
    /// Routes on the path suffix so a base URL can be prepended freely.
    /// Errors are rendered as strings, the way an HTTP layer would turn
    /// them into an error status.
    pub fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        self.route(path, body).map_err(|e| {
            warn!(%path, error = %e, "request rejected");
            e.to_string()
        })
    }

    fn route(&self, path: &str, body: &[u8]) -> ServerResult<Vec<u8>> {
        let request = if path.ends_with(GET_CHANGES_PATH) {
            SyncMessage::GetMoreChangesRequest(GetMoreChangesRequest::decode(body)?)
        } else if path.ends_with(SEND_CHANGES_PATH) {
            SyncMessage::SendChangesRequest(SendChangesRequest::decode(body)?)
        } else {
            return Err(ServerError::UnknownEndpoint(path.to_string()));
        };
        Ok(self.handle_message(request)?.encode()?)
    }

    /// Rows uploaded by a session.
    pub fn received_changes(&self, session_id: &Uuid) -> Option<ContainerSet> {
        self.context.received_changes(session_id)
    }

    /// Applied statistics for a session's upload.
    pub fn applied(&self, session_id: &Uuid) -> Option<DatabaseChangesApplied> {
        self.context.applied(session_id)
    }

    /// Drops the uploads recorded for a session.
    ///
    /// Sessions are otherwise kept for the life of the server so that
    /// `received_changes` stays readable after the exchange.
    pub fn forget_session(&self, session_id: &Uuid) -> bool {
        self.context.forget_session(session_id)
    }

    /// Number of sessions with recorded uploads.
    pub fn session_count(&self) -> usize {
        self.context.session_count()
    }
}
