//! acdb CLI
//!
//! Command-line tools for keeping AtCoder dataset caches current.
//!
//! # Commands
//!
//! - `sync` - Fetch what is missing, whatever the dependencies say
//! - `status` - Show dependency evaluation and row counts without fetching
//! - `reset` - Forget a dataset's table, raw responses and markers
//! - `show` - Print rows of a dataset, syncing it first when stale, optionally
//!   grouped

mod commands;

use clap::{Parser, Subcommand};
use commands::EngineOptions;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// acdb dataset cache tools.
#[derive(Parser)]
#[command(name = "acdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding tables, raw responses and the state file
    #[arg(global = true, long, default_value = "data")]
    cache_root: PathBuf,

    /// Dataset registry as JSON (default: built-in AtCoder datasets)
    #[arg(global = true, long)]
    registry: Option<PathBuf>,

    /// Bulk submissions file to build the submissions tail on
    #[arg(global = true, long)]
    base_snapshot: Option<PathBuf>,

    /// Pause after every request, in milliseconds
    #[arg(global = true, long)]
    delay_ms: Option<u64>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync datasets now (all of them when none is named)
    Sync {
        /// Datasets to sync
        datasets: Vec<String>,

        /// Discard persisted markers and start from the registry defaults
        #[arg(long)]
        force: bool,
    },

    /// Show dependency evaluation and row counts without fetching
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Remove a dataset's table, raw responses and markers
    Reset {
        /// Dataset to reset
        dataset: String,
    },

    /// Print rows of a dataset
    Show {
        /// Dataset to read
        dataset: String,

        /// Keep rows where a column equals a value (column=value)
        #[arg(short, long = "where")]
        filters: Vec<String>,

        /// Group rows by a column
        #[arg(short, long)]
        group_by: Option<String>,

        /// Reduction per group, as op(column); needs --group-by
        #[arg(short, long)]
        agg: Vec<String>,

        /// Maximum number of rows to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (jsonl, text)
        #[arg(short, long, default_value = "jsonl")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let options = EngineOptions {
        cache_root: cli.cache_root,
        registry: cli.registry,
        base_snapshot: cli.base_snapshot,
        delay: cli.delay_ms.map(Duration::from_millis),
        force_reinit: false,
    };

    match cli.command {
        Commands::Sync { datasets, force } => {
            let options = EngineOptions {
                force_reinit: force,
                ..options
            };
            let mut engine = commands::open_engine(&options)?;
            commands::sync::run(&mut engine, &datasets)?;
        }
        Commands::Status { format } => {
            let mut engine = commands::open_engine(&options)?;
            commands::status::run(&mut engine, &format)?;
        }
        Commands::Reset { dataset } => {
            let mut engine = commands::open_engine(&options)?;
            commands::reset::run(&mut engine, &dataset)?;
        }
        Commands::Show {
            dataset,
            filters,
            group_by,
            agg,
            limit,
            format,
        } => {
            let mut engine = commands::open_engine(&options)?;
            let args = commands::show::ShowArgs {
                filters,
                group_by,
                aggs: agg,
                limit,
            };
            commands::show::run(&mut engine, &dataset, &args, &format)?;
        }
        Commands::Version => {
            println!("acdb CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
