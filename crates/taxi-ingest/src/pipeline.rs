//! Per-file import pipeline
//!
//! For one file: ledger and lock gate, then read, normalize, and load each
//! batch in its own transaction, then write the ledger entry. The lock is
//! released on every exit path, panics included.
//!
//! Batches are committed as they load. A crash between the last batch
//! commit and the ledger insert leaves rows without a ledger entry, and the
//! next run loads the file again.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use futures::FutureExt;
use indicatif::ProgressBar;
use serde::Serialize;
use sqlx::{Connection, PgConnection};
use taxi_common::types::LoadStrategy;

use crate::error::{IngestError, IngestResult};
use crate::ledger;
use crate::loader::{writer_for, BatchWriter};
use crate::lock::{self, Gate};
use crate::normalize::{NormalizedBatch, Normalizer};
use crate::reader::BatchReader;
use crate::schema::TableSchema;

/// How a single file ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Imported { rows: u64, batches: u64 },
    /// Dry run: the first non-empty batch was read and normalized
    Validated { rows: u64 },
    AlreadyImported,
    LockDenied,
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub batch_size: usize,
    pub strategy: LoadStrategy,
    pub insert_page_size: usize,
    pub dry_run: bool,
}

pub struct FileImporter {
    schema: Arc<TableSchema>,
    normalizer: Normalizer,
    writer: Box<dyn BatchWriter>,
    batch_size: usize,
    dry_run: bool,
    rows_bar: ProgressBar,
}

impl FileImporter {
    pub fn new(schema: Arc<TableSchema>, options: &ImportOptions) -> Self {
        Self {
            normalizer: Normalizer::new(schema.clone()),
            writer: writer_for(options.strategy, schema.clone(), options.insert_page_size),
            schema,
            batch_size: options.batch_size,
            dry_run: options.dry_run,
            rows_bar: ProgressBar::hidden(),
        }
    }

    /// Report loaded rows on `bar`; its length is reset per file
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.rows_bar = bar;
        self
    }

    /// Import one file on `conn`
    ///
    /// Never fails: read, load, and database errors are reported as
    /// [`FileOutcome::Failed`] so the caller can continue with other files.
    pub async fn import(&self, conn: &mut PgConnection, path: &Path) -> FileOutcome {
        let file_name = file_key(path);

        let gate = match lock::acquire(&mut *conn, &file_name).await {
            Ok(gate) => gate,
            Err(e) => {
                tracing::error!(error = %e, "Import gate check failed");
                return FileOutcome::Failed {
                    reason: e.to_string(),
                };
            },
        };

        let file_lock = match gate {
            Gate::AlreadyImported => {
                tracing::info!("Already imported, skipping");
                return FileOutcome::AlreadyImported;
            },
            Gate::LockDenied => {
                tracing::info!("Locked by another process, skipping");
                return FileOutcome::LockDenied;
            },
            Gate::Acquired(file_lock) => file_lock,
        };

        let result = AssertUnwindSafe(self.load_file(&mut *conn, path, &file_name))
            .catch_unwind()
            .await;

        file_lock.release(conn).await;

        match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Import failed");
                FileOutcome::Failed {
                    reason: e.to_string(),
                }
            },
            Err(panic) => {
                let reason = format!("import panicked: {}", panic_message(panic.as_ref()));
                tracing::error!(reason = %reason, "Import aborted");
                FileOutcome::Failed { reason }
            },
        }
    }

    async fn load_file(
        &self,
        conn: &mut PgConnection,
        path: &Path,
        file_name: &str,
    ) -> IngestResult<FileOutcome> {
        let reader = BatchReader::open(path, self.batch_size)?;
        tracing::info!(
            total_rows = reader.total_rows(),
            row_groups = reader.row_groups(),
            dry_run = self.dry_run,
            "Starting file"
        );
        self.rows_bar.set_length(reader.total_rows());
        self.rows_bar.set_position(0);

        let mut rows = 0u64;
        let mut batches = 0u64;

        for (index, batch) in reader.enumerate() {
            let batch_no = index + 1;
            let batch = batch?;
            let (normalized, report) = self.normalizer.normalize(&batch)?;

            if !report.is_clean() {
                tracing::debug!(
                    batch = batch_no,
                    synthesized = ?report.synthesized,
                    dropped = ?report.dropped,
                    coerced_cells = report.coerced_cells,
                    "Batch normalized with changes"
                );
            }
            if normalized.is_empty() {
                continue;
            }

            if self.dry_run {
                let rows = normalized.num_rows() as u64;
                tracing::info!(batch = batch_no, rows, "Dry run: first batch readable, stopping");
                return Ok(FileOutcome::Validated { rows });
            }

            let written = self.commit_batch(&mut *conn, &normalized).await?;
            rows += written;
            batches += 1;
            self.rows_bar.inc(written);

            tracing::info!(batch = batch_no, rows = written, total = rows, "Batch committed");
        }

        if self.dry_run {
            return Ok(FileOutcome::Validated { rows: 0 });
        }

        // Ledger entry only after every batch committed
        let mut tx = conn.begin().await?;
        let inserted = ledger::record(&mut *tx, file_name, rows as i64).await?;
        tx.commit().await?;

        if !inserted {
            tracing::warn!("Ledger entry already present, kept existing row");
        }
        tracing::info!(rows, batches, strategy = %self.writer.strategy(), "File done");

        Ok(FileOutcome::Imported { rows, batches })
    }

    /// Load one batch in its own transaction
    async fn commit_batch(&self, conn: &mut PgConnection, batch: &NormalizedBatch) -> IngestResult<u64> {
        let table = self.schema.table();
        let mut tx = conn.begin().await.map_err(|e| IngestError::load(table, e))?;

        match self.writer.write(&mut *tx, batch).await {
            Ok(written) => {
                tx.commit().await.map_err(|e| IngestError::load(table, e))?;
                Ok(written)
            },
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "Rollback after failed batch also failed");
                }
                Err(e)
            },
        }
    }
}

/// Ledger key for a path: its file name
pub fn file_key(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}
