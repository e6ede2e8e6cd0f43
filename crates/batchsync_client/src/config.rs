//! Configuration for the transfer client.

use std::time::Duration;

/// Configuration for batched transfers.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Remote host identifier, reported as the source of every progress event.
    pub host: String,
    /// Protocol version.
    pub protocol_version: u16,
    /// Maximum rows per uploaded batch; `None` sends one unbatched envelope.
    pub upload_batch_rows: Option<usize>,
    /// Timeout for a single batch exchange.
    pub timeout: Duration,
}

impl ClientConfig {
    /// Creates a new configuration for `host`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            protocol_version: 1,
            upload_batch_rows: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the upload batch size in rows.
    pub fn with_upload_batch_rows(mut self, rows: usize) -> Self {
        self.upload_batch_rows = Some(rows);
        self
    }

    /// Sets the per-batch timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the protocol version.
    pub fn with_protocol_version(mut self, version: u16) -> Self {
        self.protocol_version = version;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("")
    }
}
