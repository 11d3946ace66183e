//! Taxi Ingest Library
//!
//! Batch import of columnar trip-record files into Postgres.
//!
//! Files are imported at most once: a ledger table records completed files,
//! and a per-file advisory lock keeps independent processes from loading the
//! same file at the same time.
//!
//! # Pipeline
//!
//! - [`reader`]: bounded record batches from one Parquet file
//! - [`normalize`]: coerce each batch to the declared [`TableSchema`]
//! - [`loader`]: write a batch with `COPY` or paged `INSERT`
//! - [`lock`] and [`ledger`]: skip completed or in-flight files
//! - [`pipeline`]: per-batch commits and the ledger write for one file
//! - [`orchestrator`]: discovery, the run loop, and the summary
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use taxi_ingest::{run_import, IngestConfig, RunOptions, Store, TableSchema};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::load()?;
//!     let store = Store::connect(&config.database, Arc::new(TableSchema::yellow_taxi_trips())).await?;
//!     let summary = run_import(&store, &RunOptions::from_config(&config)).await?;
//!     println!("{} files imported", summary.imported_files);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod loader;
pub mod lock;
pub mod normalize;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod reader;
pub mod schema;
pub mod stats;

pub use config::IngestConfig;
pub use db::{DatabaseConfig, Store};
pub use error::{IngestError, IngestResult};
pub use orchestrator::{discover_files, run_import, FileReport, RunOptions, RunSummary};
pub use pipeline::{FileImporter, FileOutcome, ImportOptions};
pub use schema::{ColumnKind, ColumnSpec, TableSchema};
