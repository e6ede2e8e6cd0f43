//! Simulate command implementation.

use batchsync_client::{BatchOrchestrator, ClientConfig, HttpTransport, LoopbackClient, ProgressArgs};
use batchsync_protocol::{ContainerSet, SyncRow, Value};
use batchsync_server::{BatchServer, ServerConfig};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const HOST: &str = "localhost:5000";

/// Errors raised by the simulate command.
#[derive(Debug, Error)]
pub enum SimulateError {
    /// Invalid command-line options.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// The async runtime could not start.
    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    /// The exchange failed.
    #[error("exchange failed: {0}")]
    Sync(#[from] batchsync_client::SyncError),
}

/// Options for one simulated exchange.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    /// Number of tables on each side.
    pub tables: usize,
    /// Rows per table on each side.
    pub rows: usize,
    /// Rows per download batch.
    pub download_batch: Option<usize>,
    /// Rows per upload batch.
    pub upload_batch: Option<usize>,
    /// Delay applied by the async observer, in milliseconds.
    pub observer_delay_ms: u64,
}

/// Totals of a finished simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulateSummary {
    /// Upload envelopes sent.
    pub batches_sent: u32,
    /// Rows uploaded.
    pub rows_sent: u64,
    /// Download envelopes received.
    pub batches_received: u32,
    /// Rows downloaded.
    pub rows_received: usize,
    /// Rows the server reported as selected.
    pub total_selected: u64,
    /// Rows the server reported as applied.
    pub total_applied: u64,
}

/// Runs the simulate command.
pub fn run(options: &SimulateOptions) -> Result<(), SimulateError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let summary = runtime.block_on(simulate(options, true))?;

    println!();
    println!("Exchange complete");
    println!("  upload:   {} batches, {} rows", summary.batches_sent, summary.rows_sent);
    println!(
        "  download: {} batches, {} rows",
        summary.batches_received, summary.rows_received
    );
    println!("  server selected: {}", summary.total_selected);
    println!("  server applied:  {}", summary.total_applied);
    Ok(())
}

/// Runs one exchange over a loopback transport.
///
/// With `print` set, every progress message is written to stdout: upload
/// and download requests by a synchronous observer, download responses by
/// an asynchronous one.
pub async fn simulate(
    options: &SimulateOptions,
    print: bool,
) -> Result<SimulateSummary, SimulateError> {
    if options.tables == 0 {
        return Err(SimulateError::InvalidOptions(
            "at least one table is required".into(),
        ));
    }

    let mut server_config = ServerConfig::new();
    if let Some(rows) = options.download_batch {
        server_config = server_config.with_download_batch_rows(rows);
    }
    let server = Arc::new(BatchServer::new(server_config));
    server.load_changes(seed("Server", options.tables, options.rows));

    let handler = Arc::clone(&server);
    let client = LoopbackClient::new(move |path: &str, body: &[u8]| handler.handle_post(path, body));
    let transport = HttpTransport::new(format!("http://{HOST}"), client);

    let mut config = ClientConfig::new(HOST);
    if let Some(rows) = options.upload_batch {
        config = config.with_upload_batch_rows(rows);
    }
    let orchestrator = BatchOrchestrator::new(config, transport);

    if print {
        let interceptors = orchestrator.interceptors();
        interceptors.on_http_sending_changes_request(|args| println!("{}", args.message()));
        interceptors.on_http_getting_changes_request(|args| println!("{}", args.message()));

        let delay = Duration::from_millis(options.observer_delay_ms);
        interceptors.on_http_getting_changes_response_async(move |args| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            println!("{}", args.message());
        });
    }

    let context = orchestrator.new_context("DefaultScope");
    let local = seed("Client", options.tables, options.rows);
    let result = orchestrator.exchange_changes(&context, &local).await?;

    info!(
        session_id = %context.session_id,
        uploaded = result.upload.rows_sent,
        downloaded = result.download.changes.rows_count(),
        "simulation finished"
    );
    server.forget_session(&context.session_id);

    Ok(SimulateSummary {
        batches_sent: result.upload.batches_sent,
        rows_sent: result.upload.rows_sent,
        batches_received: result.download.batches_received,
        rows_received: result.download.changes.rows_count(),
        total_selected: result.download.server_changes_selected.total_changes_selected(),
        total_applied: result.download.client_changes_applied.total_changes_applied(),
    })
}

/// Builds `tables` tables of `rows` rows each, every tenth row a delete.
fn seed(prefix: &str, tables: usize, rows: usize) -> ContainerSet {
    let mut set = ContainerSet::new();
    for t in 0..tables {
        let table = format!("{prefix}Table{}", t + 1);
        for r in 0..rows {
            let values = vec![Value::from(r as i64), Value::from(format!("{table}-{r}"))];
            let row = if r % 10 == 9 {
                SyncRow::deleted(values)
            } else {
                SyncRow::modified(values)
            };
            set.add_row(&table, row);
        }
    }
    set
}
