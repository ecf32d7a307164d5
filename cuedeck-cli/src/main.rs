//! Cuedeck CLI - Command-line interface
//!
//! Browse and edit a library file, and run simulated sessions.

mod commands;

use std::path::PathBuf;

use clap::Parser;
use cuedeck_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "cuedeck")]
#[command(about = "Library, edit and playback session coordinator")]
#[command(version)]
struct Cli {
    /// Library document to operate on (defaults to CUEDECK_LIBRARY_PATH or library.json)
    #[arg(long, global = true)]
    library: Option<PathBuf>,

    /// Console log level (CUEDECK_LOG overrides it with a filter directive)
    #[arg(long, global = true, value_enum, default_value_t = CliLogLevel::Warn)]
    log_level: CliLogLevel,

    /// Also write a full trace of the run into this directory
    #[arg(long, global = true)]
    trace_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let trace_file = init_tracing(cli.log_level.as_tracing_level(), cli.trace_dir.as_deref())?;
    if let Some(path) = trace_file {
        eprintln!("Writing trace to {}", path.display());
    }

    if let Err(e) = commands::handle_command(cli.command, cli.library).await {
        tracing::error!("Command failed: {e:#}");
        return Err(e);
    }

    Ok(())
}
