//! Taxi Ingest - trip-record import tool

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use taxi_common::logging::{init_logging, LogConfig, LogLevel};
use taxi_common::types::{to_pretty_json, LoadStrategy};
use taxi_ingest::{ledger, run_import, stats, IngestConfig, RunOptions, Store, TableSchema};

#[derive(Parser, Debug)]
#[command(name = "taxi-ingest")]
#[command(author, version, about = "Import TLC trip-record Parquet files into Postgres")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Database URL (overrides DATABASE_URL and PG_* variables)
    #[arg(long, global = true)]
    database_url: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import every new file under the data directory
    Run {
        /// Directory holding the Parquet files
        #[arg(short, long, env = "DATA_DIR")]
        data_dir: Option<PathBuf>,

        /// Read the first batch of each file without writing
        #[arg(long)]
        dry_run: bool,

        /// Loading strategy: copy (bulk) or values (insert)
        #[arg(short, long)]
        method: Option<LoadStrategy>,

        /// Rows per batch read from each file
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Rows per INSERT statement for the values strategy
        #[arg(long)]
        insert_page_size: Option<usize>,

        /// Only look at the top level of the data directory
        #[arg(long)]
        no_recursive: bool,

        /// Import at most this many files
        #[arg(long)]
        max_files: Option<usize>,

        /// Skip files whose name sorts before this one
        #[arg(long)]
        start_with: Option<String>,

        /// Show progress bars on stderr
        #[arg(long)]
        progress: bool,
    },

    /// List ledger entries, newest first
    Imports {
        #[arg(long)]
        limit: Option<i64>,

        #[arg(long)]
        offset: Option<i64>,
    },

    /// Print store-wide trip statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("taxi-ingest")
        .build()
        .merge_env()
        .context("Invalid logging settings")?;
    let _log_guard = init_logging(&log_config)?;

    let mut config = IngestConfig::load().context("Failed to load configuration")?;
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }

    let schema = Arc::new(TableSchema::yellow_taxi_trips());
    let store = Store::connect(&config.database, schema)
        .await
        .context("Cannot reach the database")?;

    let output = match cli.command {
        Command::Run {
            data_dir,
            dry_run,
            method,
            batch_size,
            insert_page_size,
            no_recursive,
            max_files,
            start_with,
            progress,
        } => {
            if let Some(dir) = data_dir {
                config.data_dir = dir;
            }
            if let Some(method) = method {
                config.method = method;
            }
            if let Some(size) = batch_size {
                config.batch_size = size;
            }
            if let Some(size) = insert_page_size {
                config.insert_page_size = size;
            }
            if no_recursive {
                config.recursive = false;
            }
            config.validate()?;

            let options = RunOptions {
                dry_run,
                max_files,
                start_with,
                progress,
                ..RunOptions::from_config(&config)
            };
            let summary = run_import(&store, &options).await?;
            to_pretty_json(&summary)?
        },
        Command::Imports { limit, offset } => {
            store.ensure_tables().await?;
            let entries = ledger::list_imports(store.pool(), limit, offset).await?;
            to_pretty_json(&entries)?
        },
        Command::Stats => {
            store.ensure_tables().await?;
            to_pretty_json(&stats::store_statistics(&store).await?)?
        },
    };

    println!("{}", output);
    store.close().await;
    Ok(())
}
