//! batchsync CLI
//!
//! Command-line tools for exercising batched change transfers.
//!
//! # Commands
//!
//! - `simulate` - Run an upload/download exchange against an in-process server
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// batchsync command-line tools.
#[derive(Parser)]
#[command(name = "batchsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an exchange against an in-process server and print progress
    Simulate {
        /// Number of tables on each side
        #[arg(short, long, default_value = "2")]
        tables: usize,

        /// Rows per table on each side
        #[arg(short, long, default_value = "25")]
        rows: usize,

        /// Rows per download batch (unbatched if omitted)
        #[arg(short, long)]
        download_batch: Option<usize>,

        /// Rows per upload batch (unbatched if omitted)
        #[arg(short, long)]
        upload_batch: Option<usize>,

        /// Delay applied by the async observer, in milliseconds
        #[arg(long, default_value = "0")]
        observer_delay_ms: u64,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Simulate {
            tables,
            rows,
            download_batch,
            upload_batch,
            observer_delay_ms,
        } => {
            let options = commands::simulate::SimulateOptions {
                tables,
                rows,
                download_batch,
                upload_batch,
                observer_delay_ms,
            };
            commands::simulate::run(&options)?;
        }
        Commands::Version => {
            println!("batchsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
