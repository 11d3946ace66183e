//! Import engine errors
//!
//! Skips (file already in the ledger, lock held elsewhere) are not errors;
//! see [`crate::pipeline::FileOutcome`].

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for import operations
pub type IngestResult<T> = Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// The columnar file is missing, corrupt, or undecodable. Aborts that file only.
    #[error("Failed to read source file {}: {message}", path.display())]
    SourceRead { path: PathBuf, message: String },

    /// A batch could not be written. Aborts that file only.
    #[error("Failed to load batch into {table}: {source}")]
    Load {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    /// The declared target schema is unusable
    #[error("Invalid table schema: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Ledger, lock, or connectivity failure outside a batch load
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Common(#[from] taxi_common::TaxiError),
}

impl IngestError {
    pub fn source_read(path: &Path, message: impl std::fmt::Display) -> Self {
        Self::SourceRead {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }

    pub fn load(table: &str, source: sqlx::Error) -> Self {
        Self::Load {
            table: table.to_string(),
            source,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
