//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while validating or (de)serializing protocol messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Batch index, count and last-batch flag are inconsistent.
    #[error("invalid batch info (index={batch_index}, count={batch_count}, last={is_last_batch}): {reason}")]
    InvalidBatchInfo {
        /// Batch index carried by the envelope.
        batch_index: u32,
        /// Batch count carried by the envelope.
        batch_count: u32,
        /// Last-batch flag carried by the envelope.
        is_last_batch: bool,
        /// Which invariant was broken.
        reason: &'static str,
    },

    /// Failed to encode a message to CBOR.
    #[error("encoding failed: {0}")]
    Encode(String),

    /// Failed to decode a message from CBOR.
    #[error("decoding failed: {0}")]
    Decode(String),
}

impl ProtocolError {
    /// Create an encoding error.
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode(message.into())
    }

    /// Create a decoding error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }
}
