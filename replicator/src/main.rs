//! Command line access to the consolidated changes of one replication side.

use clap::{Parser, Subcommand};

use crate::config::load_replicator_config;
use crate::core::{drain_changes, migrate, print_oldest_change_time};

mod config;
mod core;
mod migrations;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Creates the change log table if it is missing.
    Migrate,
    /// Prints the time of the oldest pending change without consuming it.
    Oldest,
    /// Consolidates pending changes oldest first and prints them as JSON lines.
    Drain {
        /// Stops after this many consolidated changes.
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing(concat!(env!("CARGO_CRATE_NAME"), "=info,consolidator=info"))?;

    let cli = Cli::parse();
    let config = load_replicator_config()?;

    match cli.command {
        Command::Migrate => migrate(&config).await,
        Command::Oldest => print_oldest_change_time(&config).await,
        Command::Drain { limit } => drain_changes(&config, limit).await,
    }
}
