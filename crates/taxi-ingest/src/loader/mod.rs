//! Batch loading into the trip table
//!
//! Two interchangeable write paths behind [`BatchWriter`]:
//!
//! - [`CopyWriter`]: `COPY ... FROM STDIN` text stream, the default
//! - [`InsertWriter`]: paged multi-row `INSERT ... VALUES`
//!
//! Both write the same column list in the same order and store the same
//! values for the same normalized input. Neither commits; the caller owns
//! the transaction.

mod copy;
mod insert;
mod typed;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgConnection;
use taxi_common::types::LoadStrategy;

use crate::error::IngestResult;
use crate::normalize::NormalizedBatch;
use crate::schema::TableSchema;

pub use copy::CopyWriter;
pub use insert::InsertWriter;

/// Postgres caps bind parameters per statement
pub const MAX_BIND_PARAMS: usize = 65_535;

pub const DEFAULT_INSERT_PAGE_SIZE: usize = 10_000;

/// Bytes buffered before each COPY data message
pub(crate) const COPY_FLUSH_BYTES: usize = 4 * 1024 * 1024;

/// Writes one normalized batch inside the caller's transaction
#[async_trait]
pub trait BatchWriter: Send + Sync {
    fn strategy(&self) -> LoadStrategy;

    /// Returns the number of rows written.
    ///
    /// Any failure is an [`IngestError::Load`](crate::IngestError::Load) and is
    /// never downgraded.
    async fn write(&self, conn: &mut PgConnection, batch: &NormalizedBatch) -> IngestResult<u64>;
}

/// Build the writer for `strategy`
pub fn writer_for(
    strategy: LoadStrategy,
    schema: Arc<TableSchema>,
    insert_page_size: usize,
) -> Box<dyn BatchWriter> {
    match strategy {
        LoadStrategy::Copy => Box::new(CopyWriter::new(schema)),
        LoadStrategy::Values => Box::new(InsertWriter::new(schema, insert_page_size)),
    }
}

/// Largest page that keeps one INSERT under the bind-parameter limit
pub fn clamp_page_size(requested: usize, columns: usize) -> usize {
    let ceiling = MAX_BIND_PARAMS / columns.max(1);
    requested.clamp(1, ceiling.max(1))
}
