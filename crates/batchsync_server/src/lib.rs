//! # batchsync Server
//!
//! Reference in-memory batch server for batchsync.
//!
//! This crate provides:
//! - Batch endpoints (get changes, send changes)
//! - Server-side change set split into download batches
//! - Per-session upload tracking and applied statistics
//!
//! It exists to drive the client end to end (loopback tests, the demo
//! CLI); persistence and conflict handling are left to real servers.
//!
//! # Protocol
//!
//! 1. Client uploads its changes batch by batch; each batch is acknowledged
//! 2. Client requests server changes batch by batch, starting at index 0
//! 3. The first download batch reports what was applied from the upload

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use server::BatchServer;
