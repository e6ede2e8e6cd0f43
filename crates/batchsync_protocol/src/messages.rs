//! Batch envelope messages.

use crate::batch::BatchInfo;
use crate::container::ContainerSet;
use crate::context::SyncContext;
use crate::error::{ProtocolError, ProtocolResult};
use crate::stats::{DatabaseChangesApplied, DatabaseChangesSelected};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// HTTP path serving download batches.
pub const GET_CHANGES_PATH: &str = "/sync/changes/get";

/// HTTP path receiving upload batches.
pub const SEND_CHANGES_PATH: &str = "/sync/changes/send";

fn to_cbor<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)
        .map_err(|e| ProtocolError::encode(e.to_string()))?;
    Ok(bytes)
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::decode(e.to_string()))
}

/// A batch protocol message.
#[derive(Debug, Clone)]
pub enum SyncMessage {
    /// Upload envelope.
    SendChangesRequest(SendChangesRequest),
    /// Upload acknowledgment.
    BatchAck(BatchAck),
    /// Download request.
    GetMoreChangesRequest(GetMoreChangesRequest),
    /// Download envelope.
    SendChangesResponse(SendChangesResponse),
}

impl SyncMessage {
    /// Returns the message type code.
    pub fn type_code(&self) -> u8 {
        match self {
            SyncMessage::SendChangesRequest(_) => 1,
            SyncMessage::BatchAck(_) => 2,
            SyncMessage::GetMoreChangesRequest(_) => 3,
            SyncMessage::SendChangesResponse(_) => 4,
        }
    }

    /// Encodes the wrapped message as an HTTP body.
    ///
    /// The body carries no type code; the endpoint path identifies the
    /// request and the request identifies the reply.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        match self {
            SyncMessage::SendChangesRequest(m) => m.encode(),
            SyncMessage::BatchAck(m) => m.encode(),
            SyncMessage::GetMoreChangesRequest(m) => m.encode(),
            SyncMessage::SendChangesResponse(m) => m.encode(),
        }
    }
}

/// Upload envelope: one batch of client changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendChangesRequest {
    /// Session context.
    pub context: SyncContext,
    /// Batch position.
    pub batch: BatchInfo,
    /// Rows in this batch.
    pub changes: ContainerSet,
}

impl SendChangesRequest {
    /// Creates an upload envelope.
    pub fn new(context: SyncContext, batch: BatchInfo, changes: ContainerSet) -> Self {
        Self {
            context,
            batch,
            changes,
        }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        from_cbor(bytes)
    }
}

/// Server acknowledgment of one uploaded batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchAck {
    /// Session context.
    pub context: SyncContext,
    /// Index of the acknowledged batch.
    pub batch_index: u32,
    /// Rows the server received in that batch.
    pub rows_received: u64,
}

impl BatchAck {
    /// Creates an acknowledgment.
    pub fn new(context: SyncContext, batch_index: u32, rows_received: u64) -> Self {
        Self {
            context,
            batch_index,
            rows_received,
        }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        from_cbor(bytes)
    }
}

/// Download request for one batch of server changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetMoreChangesRequest {
    /// Session context.
    pub context: SyncContext,
    /// Index of the batch to return.
    pub batch_index_requested: u32,
}

impl GetMoreChangesRequest {
    /// Creates a download request.
    pub fn new(context: SyncContext, batch_index_requested: u32) -> Self {
        Self {
            context,
            batch_index_requested,
        }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        from_cbor(bytes)
    }
}

/// Download envelope: one batch of server changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendChangesResponse {
    /// Session context.
    pub context: SyncContext,
    /// Batch position.
    pub batch: BatchInfo,
    /// Server timestamp to record as the client's watermark.
    pub remote_client_timestamp: i64,
    /// Rows in this batch.
    pub changes: ContainerSet,
    /// Changes the server selected for this batch.
    pub server_changes_selected: DatabaseChangesSelected,
    /// Client changes the server applied from the preceding upload.
    pub client_changes_applied: DatabaseChangesApplied,
}

impl SendChangesResponse {
    /// Creates a download envelope whose selection statistics are derived
    /// from `changes`.
    pub fn new(
        context: SyncContext,
        batch: BatchInfo,
        changes: ContainerSet,
        remote_client_timestamp: i64,
    ) -> Self {
        let server_changes_selected = DatabaseChangesSelected::from_container(&changes);
        Self {
            context,
            batch,
            remote_client_timestamp,
            changes,
            server_changes_selected,
            client_changes_applied: DatabaseChangesApplied::new(),
        }
    }

    /// Sets the applied statistics reported back to the client.
    pub fn with_client_changes_applied(mut self, applied: DatabaseChangesApplied) -> Self {
        self.client_changes_applied = applied;
        self
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        from_cbor(bytes)
    }
}
