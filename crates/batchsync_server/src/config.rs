//! Server configuration.

/// Configuration for the batch server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum rows per download batch; `None` serves one unbatched envelope.
    pub download_batch_rows: Option<usize>,
    /// Maximum rows accepted in one uploaded batch.
    pub max_upload_batch_rows: usize,
    /// Protocol version the server speaks.
    pub protocol_version: u16,
    /// Timestamp reported to clients as their new watermark.
    pub remote_timestamp: i64,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new() -> Self {
        Self {
            download_batch_rows: None,
            max_upload_batch_rows: 10_000,
            protocol_version: 1,
            remote_timestamp: 0,
        }
    }

    /// Sets the download batch size in rows.
    pub fn with_download_batch_rows(mut self, rows: usize) -> Self {
        self.download_batch_rows = Some(rows);
        self
    }

    /// Sets the maximum upload batch size.
    pub fn with_max_upload_batch_rows(mut self, rows: usize) -> Self {
        self.max_upload_batch_rows = rows;
        self
    }

    /// Sets the reported remote timestamp.
    pub fn with_remote_timestamp(mut self, timestamp: i64) -> Self {
        self.remote_timestamp = timestamp;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
