//! # batchsync Client
//!
//! Client half of the batched change-transfer protocol.
//!
//! This crate provides:
//! - `BatchOrchestrator`: batched download / upload of change sets
//! - `Interceptors`: progress observers keyed by event kind (sync or async)
//! - Progress events with stable ids and derived messages
//! - Transport abstraction with an HTTP implementation over any client
//! - A scripted transport for tests
//!
//! ## Protocol
//!
//! A logical transfer is split into envelopes carrying a batch index, a
//! batch count (0 for a single unbatched envelope) and a last-batch flag.
//! Envelopes move strictly one at a time:
//! 1. Notify observers of the upcoming request
//! 2. Exchange one envelope with the server
//! 3. Validate its position, merge its rows and statistics
//! 4. Notify observers of the response (downloads only)
//!
//! ## Key Invariants
//!
//! - Batch indexes are requested and received in order `0..batch_count`
//! - Observers of batch N finish before batch N+1 is requested
//! - Observer failures are logged, never propagated
//! - A failed transfer returns no partial result

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod events;
mod http;
mod interceptors;
pub mod message;
mod orchestrator;
mod transport;

pub use config::ClientConfig;
pub use error::{SyncError, SyncResult};
pub use events::{
    EventId, GettingChangesRequestArgs, GettingChangesResponseArgs, ProgressArgs, ProgressEvent,
    SendingChangesRequestArgs, SyncEventKind,
};
pub use http::{CborDecode, CborEncode, HttpClient, HttpTransport, LoopbackClient, LoopbackServer};
pub use interceptors::{
    DispatchReport, Interceptor, Interceptors, ObserverError, ObserverFailure, ObserverResult,
};
pub use orchestrator::{BatchOrchestrator, DownloadResult, ExchangeResult, UploadConfirmation};
pub use transport::{BatchTransport, ScriptedTransport};
