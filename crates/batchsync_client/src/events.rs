//! Progress events emitted by the orchestrator.
//!
//! Every event is an immutable record built right before dispatch. Event
//! kinds live in a reserved id range (20000..21000) so they cannot collide
//! with ids used by other subsystems of a host application.

use crate::message;
use batchsync_protocol::{
    BatchInfo, ContainerSet, DatabaseChangesApplied, DatabaseChangesSelected, SendChangesRequest,
    SendChangesResponse, SyncContext,
};
use std::fmt;

/// Stable numeric id plus symbolic name of an event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId {
    /// Numeric id.
    pub id: u32,
    /// Symbolic name.
    pub name: &'static str,
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Kinds of progress events emitted by batched HTTP transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SyncEventKind {
    /// An upload batch is about to be sent.
    HttpSendingChangesRequest,
    /// A download batch is about to be requested.
    HttpGettingChangesRequest,
    /// A download batch was received.
    HttpGettingChangesResponse,
}

impl SyncEventKind {
    /// First id of the range reserved for these events.
    pub const RANGE_START: u32 = 20_000;
    /// One past the last id of the reserved range.
    pub const RANGE_END: u32 = 21_000;

    /// All event kinds.
    pub const ALL: [SyncEventKind; 3] = [
        SyncEventKind::HttpSendingChangesRequest,
        SyncEventKind::HttpGettingChangesRequest,
        SyncEventKind::HttpGettingChangesResponse,
    ];

    /// Returns the event id for this kind.
    pub fn event_id(&self) -> EventId {
        match self {
            SyncEventKind::HttpSendingChangesRequest => EventId {
                id: 20_000,
                name: "HttpSendingChangesRequest",
            },
            SyncEventKind::HttpGettingChangesRequest => EventId {
                id: 20_100,
                name: "HttpGettingChangesRequest",
            },
            SyncEventKind::HttpGettingChangesResponse => EventId {
                id: 20_150,
                name: "HttpGettingChangesResponse",
            },
        }
    }

    /// Looks up a kind from its numeric id.
    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.event_id().id == id)
    }
}

/// Common view over every progress event.
pub trait ProgressArgs {
    /// Session context of the transfer.
    fn context(&self) -> &SyncContext;

    /// Remote host the event concerns.
    fn source(&self) -> &str;

    /// Human-readable description.
    fn message(&self) -> String;

    /// Event kind identifier.
    fn event_id(&self) -> EventId;
}

/// Emitted before a download batch is requested.
#[derive(Debug, Clone)]
pub struct GettingChangesRequestArgs {
    context: SyncContext,
    batch_index_requested: u32,
    last_batch_index_received: i64,
    batch_count: u32,
    host: String,
}

impl GettingChangesRequestArgs {
    /// Creates the event.
    pub fn new(
        context: SyncContext,
        batch_index_requested: u32,
        last_batch_index_received: i64,
        batch_count: u32,
        host: impl Into<String>,
    ) -> Self {
        Self {
            context,
            batch_index_requested,
            last_batch_index_received,
            batch_count,
            host: host.into(),
        }
    }

    /// Index of the batch about to be requested.
    pub fn batch_index_requested(&self) -> u32 {
        self.batch_index_requested
    }

    /// Index of the last batch received, or -1 before the first.
    pub fn last_batch_index_received(&self) -> i64 {
        self.last_batch_index_received
    }

    /// Batch count known so far (0 until the first batch arrives).
    pub fn batch_count(&self) -> u32 {
        self.batch_count
    }
}

impl ProgressArgs for GettingChangesRequestArgs {
    fn context(&self) -> &SyncContext {
        &self.context
    }

    fn source(&self) -> &str {
        &self.host
    }

    fn message(&self) -> String {
        message::getting_changes_request(self.batch_index_requested, self.batch_count)
    }

    fn event_id(&self) -> EventId {
        SyncEventKind::HttpGettingChangesRequest.event_id()
    }
}

/// Emitted after a download batch was received and merged.
#[derive(Debug, Clone)]
pub struct GettingChangesResponseArgs {
    response: SendChangesResponse,
    aggregate_changes_selected: DatabaseChangesSelected,
    host: String,
}

impl GettingChangesResponseArgs {
    /// Creates the event from a received batch and the running totals.
    pub fn new(
        response: SendChangesResponse,
        aggregate_changes_selected: DatabaseChangesSelected,
        host: impl Into<String>,
    ) -> Self {
        Self {
            response,
            aggregate_changes_selected,
            host: host.into(),
        }
    }

    /// Batch position.
    pub fn batch(&self) -> BatchInfo {
        self.response.batch
    }

    /// Batch index sent by the server.
    pub fn batch_index(&self) -> u32 {
        self.response.batch.batch_index
    }

    /// Batch count sent by the server.
    pub fn batch_count(&self) -> u32 {
        self.response.batch.batch_count
    }

    /// Whether this is the last batch.
    pub fn is_last_batch(&self) -> bool {
        self.response.batch.is_last_batch
    }

    /// Server timestamp reported with the batch.
    pub fn remote_client_timestamp(&self) -> i64 {
        self.response.remote_client_timestamp
    }

    /// Rows of this batch.
    pub fn changes(&self) -> &ContainerSet {
        &self.response.changes
    }

    /// Server selection statistics reported with this batch.
    pub fn server_changes_selected(&self) -> &DatabaseChangesSelected {
        &self.response.server_changes_selected
    }

    /// Applied statistics reported with this batch.
    pub fn client_changes_applied(&self) -> &DatabaseChangesApplied {
        &self.response.client_changes_applied
    }

    /// Selection statistics accumulated up to and including this batch.
    pub fn aggregate_changes_selected(&self) -> &DatabaseChangesSelected {
        &self.aggregate_changes_selected
    }
}

impl ProgressArgs for GettingChangesResponseArgs {
    fn context(&self) -> &SyncContext {
        &self.response.context
    }

    fn source(&self) -> &str {
        &self.host
    }

    fn message(&self) -> String {
        message::getting_changes_response(
            self.batch_index(),
            self.batch_count(),
            self.response.changes.rows_count(),
            self.aggregate_changes_selected.total_changes_selected(),
        )
    }

    fn event_id(&self) -> EventId {
        SyncEventKind::HttpGettingChangesResponse.event_id()
    }
}

/// Emitted before an upload batch is sent.
#[derive(Debug, Clone)]
pub struct SendingChangesRequestArgs {
    request: SendChangesRequest,
    rows_count: usize,
    total_rows_count: usize,
    host: String,
}

impl SendingChangesRequestArgs {
    /// Creates the event.
    pub fn new(
        request: SendChangesRequest,
        rows_count: usize,
        total_rows_count: usize,
        host: impl Into<String>,
    ) -> Self {
        Self {
            request,
            rows_count,
            total_rows_count,
            host: host.into(),
        }
    }

    /// The envelope about to be sent.
    pub fn request(&self) -> &SendChangesRequest {
        &self.request
    }

    /// Rows in this batch.
    pub fn rows_count(&self) -> usize {
        self.rows_count
    }

    /// Rows in the whole upload.
    pub fn total_rows_count(&self) -> usize {
        self.total_rows_count
    }
}

impl ProgressArgs for SendingChangesRequestArgs {
    fn context(&self) -> &SyncContext {
        &self.request.context
    }

    fn source(&self) -> &str {
        &self.host
    }

    fn message(&self) -> String {
        message::sending_changes_request(
            self.request.batch.batch_index,
            self.request.batch.batch_count,
            self.rows_count,
            self.total_rows_count,
        )
    }

    fn event_id(&self) -> EventId {
        SyncEventKind::HttpSendingChangesRequest.event_id()
    }
}

/// Any progress event.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Upload batch about to be sent.
    SendingChangesRequest(SendingChangesRequestArgs),
    /// Download batch about to be requested.
    GettingChangesRequest(GettingChangesRequestArgs),
    /// Download batch received.
    GettingChangesResponse(GettingChangesResponseArgs),
}

impl ProgressEvent {
    /// Kind of this event.
    pub fn kind(&self) -> SyncEventKind {
        match self {
            ProgressEvent::SendingChangesRequest(_) => SyncEventKind::HttpSendingChangesRequest,
            ProgressEvent::GettingChangesRequest(_) => SyncEventKind::HttpGettingChangesRequest,
            ProgressEvent::GettingChangesResponse(_) => SyncEventKind::HttpGettingChangesResponse,
        }
    }

    /// Borrows the download request args, if this is one.
    pub fn as_getting_changes_request(&self) -> Option<&GettingChangesRequestArgs> {
        match self {
            ProgressEvent::GettingChangesRequest(args) => Some(args),
            _ => None,
        }
    }

    /// Borrows the download response args, if this is one.
    pub fn as_getting_changes_response(&self) -> Option<&GettingChangesResponseArgs> {
        match self {
            ProgressEvent::GettingChangesResponse(args) => Some(args),
            _ => None,
        }
    }

    /// Borrows the upload request args, if this is one.
    pub fn as_sending_changes_request(&self) -> Option<&SendingChangesRequestArgs> {
        match self {
            ProgressEvent::SendingChangesRequest(args) => Some(args),
            _ => None,
        }
    }

    /// Takes the download request args, if this is one.
    pub fn into_getting_changes_request(self) -> Option<GettingChangesRequestArgs> {
        match self {
            ProgressEvent::GettingChangesRequest(args) => Some(args),
            _ => None,
        }
    }

    /// Takes the download response args, if this is one.
    pub fn into_getting_changes_response(self) -> Option<GettingChangesResponseArgs> {
        match self {
            ProgressEvent::GettingChangesResponse(args) => Some(args),
            _ => None,
        }
    }

    /// Takes the upload request args, if this is one.
    pub fn into_sending_changes_request(self) -> Option<SendingChangesRequestArgs> {
        match self {
            ProgressEvent::SendingChangesRequest(args) => Some(args),
            _ => None,
        }
    }

    fn args(&self) -> &dyn ProgressArgs {
        match self {
            ProgressEvent::SendingChangesRequest(args) => args,
            ProgressEvent::GettingChangesRequest(args) => args,
            ProgressEvent::GettingChangesResponse(args) => args,
        }
    }
}

impl ProgressArgs for ProgressEvent {
    fn context(&self) -> &SyncContext {
        self.args().context()
    }

    fn source(&self) -> &str {
        self.args().source()
    }

    fn message(&self) -> String {
        self.args().message()
    }

    fn event_id(&self) -> EventId {
        self.args().event_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchsync_protocol::{SyncRow, Value};

    #[test]
    fn event_ids_are_stable_and_in_range() {
        let ids: Vec<u32> = SyncEventKind::ALL.iter().map(|k| k.event_id().id).collect();
        assert_eq!(ids, vec![20_000, 20_100, 20_150]);
        assert!(ids
            .iter()
            .all(|id| (SyncEventKind::RANGE_START..SyncEventKind::RANGE_END).contains(id)));
        assert_eq!(
            SyncEventKind::from_id(20_150),
            Some(SyncEventKind::HttpGettingChangesResponse)
        );
        assert_eq!(SyncEventKind::from_id(1), None);
    }

    #[test]
    fn event_id_display() {
        let id = SyncEventKind::HttpGettingChangesRequest.event_id();
        assert_eq!(id.to_string(), "HttpGettingChangesRequest (20100)");
    }

    #[test]
    fn request_event_fields() {
        let ctx = SyncContext::new("sales");
        let args = GettingChangesRequestArgs::new(ctx.clone(), 0, -1, 0, "https://host");
        assert_eq!(args.context(), &ctx);
        assert_eq!(args.source(), "https://host");
        assert_eq!(args.last_batch_index_received(), -1);
        assert_eq!(args.message(), "Getting All Changes");
    }

    #[test]
    fn response_event_message_uses_batch_rows() {
        let mut changes = ContainerSet::new();
        for n in 0i64..7 {
            changes.add_row("t", SyncRow::modified(vec![Value::Integer(n.into())]));
        }
        let response =
            SendChangesResponse::new(SyncContext::default(), BatchInfo::single(), changes, 42);
        let aggregate = response.server_changes_selected.clone();
        let event = ProgressEvent::GettingChangesResponse(GettingChangesResponseArgs::new(
            response, aggregate, "h",
        ));

        assert_eq!(event.kind(), SyncEventKind::HttpGettingChangesResponse);
        assert_eq!(event.event_id().id, 20_150);
        assert_eq!(
            event.message(),
            "Downloaded All Changes. Rows:7. Total Rows: 7."
        );
    }

    #[test]
    fn response_event_total_counts_whole_transfer() {
        let mut changes = ContainerSet::new();
        for n in 0i64..5 {
            changes.add_row("t", SyncRow::modified(vec![Value::Integer(n.into())]));
        }
        let response =
            SendChangesResponse::new(SyncContext::default(), BatchInfo::part(2, 3), changes, 0);
        let mut aggregate = DatabaseChangesSelected::new();
        aggregate.add_table("t", 20, 0);
        aggregate.merge(&response.server_changes_selected);

        let args = GettingChangesResponseArgs::new(response, aggregate, "h");
        assert_eq!(
            args.message(),
            "Downloaded Batch Changes. (3/3). Rows:5. Total Rows: 25."
        );
    }

    #[test]
    fn sending_event_message() {
        let request = SendChangesRequest::new(
            SyncContext::default(),
            BatchInfo::part(1, 2),
            ContainerSet::new(),
        );
        let event = ProgressEvent::SendingChangesRequest(SendingChangesRequestArgs::new(
            request, 3, 8, "h",
        ));
        assert_eq!(event.source(), "h");
        assert!(event.message().contains("Batches: (2/2). Rows: (3/8)"));
    }
}
