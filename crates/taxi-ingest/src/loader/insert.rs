//! Paged multi-row INSERT write path

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use taxi_common::types::LoadStrategy;

use super::typed::{downcast_columns, TypedColumn};
use super::{clamp_page_size, BatchWriter};
use crate::error::{IngestError, IngestResult};
use crate::normalize::NormalizedBatch;
use crate::schema::TableSchema;

pub struct InsertWriter {
    schema: Arc<TableSchema>,
    prefix: String,
    page_size: usize,
}

impl InsertWriter {
    /// `page_size` is clamped so one statement stays under the bind limit.
    pub fn new(schema: Arc<TableSchema>, page_size: usize) -> Self {
        let prefix = format!(
            "INSERT INTO {} ({}) ",
            schema.quoted_table(),
            schema.column_list()
        );
        let page_size = clamp_page_size(page_size, schema.columns().len());
        Self {
            schema,
            prefix,
            page_size,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn build_page<'a>(
        &self,
        columns: &[TypedColumn<'_>],
        rows: std::ops::Range<usize>,
    ) -> QueryBuilder<'a, Postgres> {
        let mut builder = QueryBuilder::<Postgres>::new(&self.prefix);
        builder.push_values(rows, |mut values, row| {
            for column in columns {
                match column {
                    TypedColumn::Int64(_) => {
                        values.push_bind(column.int64(row));
                    },
                    TypedColumn::Float64(_) => {
                        values.push_bind(column.float64(row));
                    },
                    TypedColumn::Timestamp(_) => {
                        values.push_bind(column.timestamp(row));
                    },
                    TypedColumn::Text(_) => {
                        values.push_bind(column.text(row).map(str::to_owned));
                    },
                }
            }
        });
        builder
    }
}

#[async_trait]
impl BatchWriter for InsertWriter {
    fn strategy(&self) -> LoadStrategy {
        LoadStrategy::Values
    }

    async fn write(&self, conn: &mut PgConnection, batch: &NormalizedBatch) -> IngestResult<u64> {
        let total = batch.num_rows();
        if total == 0 {
            return Ok(0);
        }

        let table = self.schema.table();
        let columns = downcast_columns(&self.schema, batch)?;
        let mut written = 0u64;

        for start in (0..total).step_by(self.page_size) {
            let end = (start + self.page_size).min(total);
            let mut page = self.build_page(&columns, start..end);
            let result = page
                .build()
                .execute(&mut *conn)
                .await
                .map_err(|e| IngestError::load(table, e))?;
            written += result.rows_affected();
        }

        tracing::debug!(table, rows = written, page_size = self.page_size, "INSERT pages finished");
        Ok(written)
    }
}
