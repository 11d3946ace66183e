//! Streaming Parquet batch reader
//!
//! Yields record batches of at most `batch_size` rows in file order. The
//! sequence is consumed once; open a new reader to read the file again.

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};

use crate::error::{IngestError, IngestResult};

pub struct BatchReader {
    path: PathBuf,
    total_rows: u64,
    row_groups: usize,
    inner: ParquetRecordBatchReader,
}

impl BatchReader {
    /// Open `path`, failing with [`IngestError::SourceRead`] if the file is
    /// missing or its footer cannot be decoded.
    pub fn open(path: &Path, batch_size: usize) -> IngestResult<Self> {
        if batch_size == 0 {
            return Err(IngestError::config("batch size must be greater than 0"));
        }

        let file = File::open(path).map_err(|e| IngestError::source_read(path, e))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| IngestError::source_read(path, e))?;

        let metadata = builder.metadata();
        let total_rows = metadata.file_metadata().num_rows().max(0) as u64;
        let row_groups = metadata.num_row_groups();

        let inner = builder
            .with_batch_size(batch_size)
            .build()
            .map_err(|e| IngestError::source_read(path, e))?;

        tracing::debug!(
            path = %path.display(),
            total_rows,
            row_groups,
            batch_size,
            "Opened parquet file"
        );

        Ok(Self {
            path: path.to_path_buf(),
            total_rows,
            row_groups,
            inner,
        })
    }

    /// Row count recorded in the file footer
    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    pub fn row_groups(&self) -> usize {
        self.row_groups
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Iterator for BatchReader {
    type Item = IngestResult<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|batch| batch.map_err(|e| IngestError::source_read(&self.path, e)))
    }
}
