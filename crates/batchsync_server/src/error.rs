//! Error types for the batch server.

use batchsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the batch server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Requested download batch does not exist.
    #[error("batch {requested} out of range ({available} batches available)")]
    BatchOutOfRange {
        /// Index the client asked for.
        requested: u32,
        /// Number of batches the server holds.
        available: usize,
    },

    /// Uploaded batch arrived out of sequence.
    #[error("upload out of order: expected batch {expected}, got {actual}")]
    UploadOutOfOrder {
        /// Index the server expected next.
        expected: u32,
        /// Index the client sent.
        actual: u32,
    },

    /// Protocol version mismatch.
    #[error("protocol version mismatch: server={server}, client={client}")]
    ProtocolMismatch {
        /// Server version.
        server: u16,
        /// Client version.
        client: u16,
    },

    /// Unknown HTTP path.
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    /// Message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] ProtocolError),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::BatchOutOfRange { .. }
                | ServerError::UploadOutOfOrder { .. }
                | ServerError::ProtocolMismatch { .. }
                | ServerError::UnknownEndpoint(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(!ServerError::Codec(ProtocolError::encode("oops")).is_client_error());
    }

    #[test]
    fn error_display() {
        let err = ServerError::UploadOutOfOrder {
            expected: 2,
            actual: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("2"));
        assert!(msg.contains("5"));
    }
}
