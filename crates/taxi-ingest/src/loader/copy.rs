//! COPY FROM STDIN write path

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgConnection;
use taxi_common::types::LoadStrategy;

use super::typed::{downcast_columns, TypedColumn};
use super::{BatchWriter, COPY_FLUSH_BYTES};
use crate::error::{IngestError, IngestResult};
use crate::normalize::NormalizedBatch;
use crate::schema::TableSchema;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub struct CopyWriter {
    schema: Arc<TableSchema>,
    statement: String,
}

impl CopyWriter {
    pub fn new(schema: Arc<TableSchema>) -> Self {
        let statement = format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT text)",
            schema.quoted_table(),
            schema.column_list()
        );
        Self { schema, statement }
    }
}

#[async_trait]
impl BatchWriter for CopyWriter {
    fn strategy(&self) -> LoadStrategy {
        LoadStrategy::Copy
    }

    async fn write(&self, conn: &mut PgConnection, batch: &NormalizedBatch) -> IngestResult<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let table = self.schema.table();
        let columns = downcast_columns(&self.schema, batch)?;

        let mut copy = conn
            .copy_in_raw(&self.statement)
            .await
            .map_err(|e| IngestError::load(table, e))?;

        let mut buf = Vec::with_capacity(COPY_FLUSH_BYTES);
        for row in 0..batch.num_rows() {
            encode_row(&mut buf, &columns, row);
            if buf.len() >= COPY_FLUSH_BYTES {
                copy.send(std::mem::take(&mut buf))
                    .await
                    .map_err(|e| IngestError::load(table, e))?;
                buf = Vec::with_capacity(COPY_FLUSH_BYTES);
            }
        }
        if !buf.is_empty() {
            copy.send(buf).await.map_err(|e| IngestError::load(table, e))?;
        }

        let rows = copy.finish().await.map_err(|e| IngestError::load(table, e))?;

        tracing::debug!(table, rows, "COPY finished");
        Ok(rows)
    }
}

/// Append one text-format line for `row`
pub(crate) fn encode_row(buf: &mut Vec<u8>, columns: &[TypedColumn<'_>], row: usize) {
    for (pos, column) in columns.iter().enumerate() {
        if pos > 0 {
            buf.push(b'\t');
        }
        encode_value(buf, column, row);
    }
    buf.push(b'\n');
}

fn encode_value(buf: &mut Vec<u8>, column: &TypedColumn<'_>, row: usize) {
    match column {
        TypedColumn::Int64(_) => match column.int64(row) {
            Some(v) => {
                let _ = write!(buf, "{}", v);
            },
            None => push_null(buf),
        },
        TypedColumn::Float64(_) => match column.float64(row) {
            Some(v) if v.is_nan() => buf.extend_from_slice(b"NaN"),
            Some(v) if v.is_infinite() => {
                let literal: &[u8] = if v > 0.0 { b"Infinity" } else { b"-Infinity" };
                buf.extend_from_slice(literal);
            },
            Some(v) => {
                let _ = write!(buf, "{}", v);
            },
            None => push_null(buf),
        },
        TypedColumn::Timestamp(_) => match column.timestamp(row) {
            Some(ts) => {
                let _ = write!(buf, "{}", ts.format(TIMESTAMP_FORMAT));
            },
            None => push_null(buf),
        },
        TypedColumn::Text(_) => match column.text(row) {
            Some(text) => escape_text(buf, text),
            None => push_null(buf),
        },
    }
}

fn push_null(buf: &mut Vec<u8>) {
    buf.extend_from_slice(b"\\N");
}

fn escape_text(buf: &mut Vec<u8>, text: &str) {
    for byte in text.bytes() {
        match byte {
            b'\\' => buf.extend_from_slice(b"\\\\"),
            b'\t' => buf.extend_from_slice(b"\\t"),
            b'\n' => buf.extend_from_slice(b"\\n"),
            b'\r' => buf.extend_from_slice(b"\\r"),
            _ => buf.push(byte),
        }
    }
}
