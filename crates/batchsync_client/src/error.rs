//! Error types for the transfer client.

use batchsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for transfer operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that abort a batched transfer.
///
/// Variants fall in two families so callers can tell "server unreachable"
/// from "server misbehaved": transport failures ([`SyncError::is_transport`])
/// and protocol violations ([`SyncError::is_protocol`]).
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A batch exchange exceeded the configured timeout.
    #[error("operation timed out")]
    Timeout,

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,

    /// Server rejected the request.
    #[error("server error: {0}")]
    ServerError(String),

    /// The server answered with a different batch than the one requested.
    #[error("batch out of order: requested {requested}, received {received}")]
    BatchOutOfOrder {
        /// Index the client asked for.
        requested: u32,
        /// Index the server returned.
        received: u32,
    },

    /// The batch count changed in the middle of a transfer.
    #[error("batch count changed mid-transfer: expected {expected}, received {received}")]
    BatchCountChanged {
        /// Count announced by the first batch.
        expected: u32,
        /// Count carried by a later batch.
        received: u32,
    },

    /// The envelope's batch info breaks the batch invariants.
    #[error("invalid batch: {0}")]
    InvalidBatch(#[from] ProtocolError),

    /// The server acknowledged a different batch than the one sent.
    #[error("acknowledgment mismatch: sent batch {sent}, server acknowledged {acknowledged}")]
    AckMismatch {
        /// Index of the batch sent.
        sent: u32,
        /// Index in the acknowledgment.
        acknowledged: u32,
    },

    /// The server answered with another protocol version.
    #[error("protocol version mismatch: local={local}, remote={remote}")]
    VersionMismatch {
        /// Local protocol version.
        local: u16,
        /// Remote protocol version.
        remote: u16,
    },

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true for network-level failures.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SyncError::Transport { .. }
                | SyncError::Timeout
                | SyncError::NotConnected
                | SyncError::ServerError(_)
        )
    }

    /// Returns true when the server broke the batch sequence.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            SyncError::BatchOutOfOrder { .. }
                | SyncError::BatchCountChanged { .. }
                | SyncError::InvalidBatch(_)
                | SyncError::AckMismatch { .. }
                | SyncError::VersionMismatch { .. }
        )
    }

    /// Returns true if the whole transfer can be attempted again.
    ///
    /// The orchestrator itself never retries; this is advice for callers.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            SyncError::ServerError(_) => true,
            _ => false,
        }
    }
}
