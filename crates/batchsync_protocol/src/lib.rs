//! # batchsync Protocol
//!
//! Protocol types and CBOR codecs for batched change transfers.
//!
//! This crate provides:
//! - `SyncContext` threaded through every message
//! - `ContainerSet` for per-table row changes
//! - `DatabaseChangesSelected` / `DatabaseChangesApplied` transfer statistics
//! - `BatchInfo` and the batch envelope messages (get, send, ack)
//! - CBOR encoding/decoding
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod container;
mod context;
mod error;
mod messages;
mod stats;

pub use batch::BatchInfo;
pub use container::{ContainerSet, ContainerTable, RowState, SyncRow};
pub use context::SyncContext;
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    BatchAck, GetMoreChangesRequest, SendChangesRequest, SendChangesResponse, SyncMessage,
    GET_CHANGES_PATH, SEND_CHANGES_PATH,
};
pub use stats::{
    DatabaseChangesApplied, DatabaseChangesSelected, TableChangesApplied, TableChangesSelected,
};

/// Re-export of the CBOR value type used for row cells.
pub use ciborium::value::Value;
