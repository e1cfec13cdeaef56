//! tracksync CLI
//!
//! Command-line tools for tracksync record files and pending queues.
//!
//! # Commands
//!
//! - `validate` - Check a file of remote records
//! - `merge` - Merge a remote record file into a local one
//! - `queue list` - Show pending operations
//! - `queue clear` - Drop all pending operations

mod commands;

use clap::{Parser, Subcommand};
use commands::OutputFormat;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// tracksync command-line tools.
#[derive(Parser)]
#[command(name = "tracksync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a JSON array of remote records
    Validate {
        /// Records file
        file: PathBuf,
    },

    /// Merge remote records into local records, last writer wins
    Merge {
        /// Local records file
        #[arg(short, long)]
        local: PathBuf,

        /// Remote records file
        #[arg(short, long)]
        remote: PathBuf,

        /// Write the merged records here
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Inspect or clear a pending operation queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum QueueAction {
    /// List pending operations
    List {
        /// Path to the queue file
        #[arg(short, long)]
        path: PathBuf,

        /// Flag operations that would be dropped on their next failure
        #[arg(short, long)]
        max_attempts: Option<u32>,
    },

    /// Remove all pending operations
    Clear {
        /// Path to the queue file
        #[arg(short, long)]
        path: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate { file } => commands::validate::run(&file, cli.format)?,
        Commands::Merge { local, remote, out } => {
            commands::merge::run(&local, &remote, out.as_deref(), cli.format)?;
        }
        Commands::Queue { action } => match action {
            QueueAction::List { path, max_attempts } => {
                commands::queue::list(&path, max_attempts, cli.format)?;
            }
            QueueAction::Clear { path } => {
                commands::queue::clear(&path)?;
            }
        },
        Commands::Version => {
            println!("tracksync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
