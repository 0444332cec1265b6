use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rudder::cli;
use rudder::config::RudderConfig;

#[derive(Parser)]
#[command(name = "rudder", version, about = "Adaptive model router with a learning insight store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show insight store and model performance statistics
    Stats,
    /// Display full details for a single insight
    Inspect {
        /// Row id or message id of the insight
        id: String,
    },
    /// Export all insights and model statistics as JSON to stdout
    Export,
    /// Delete all insights and statistics after confirmation
    Reset,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level and database path)
    let config = RudderConfig::load()?;

    // Initialize tracing with the configured log level. Log to stderr so
    // stdout stays clean for command output (export writes JSON there).
    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Stats => cli::stats::stats(&config)?,
        Command::Inspect { id } => cli::inspect::inspect(&config, &id)?,
        Command::Export => cli::export::export(&config)?,
        Command::Reset => cli::reset::reset(&config)?,
    }

    Ok(())
}
