//! Import ledger
//!
//! One row per fully imported file. An entry is written once, after the last
//! batch of its file has committed, and never updated.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use taxi_common::types::ImportLogEntry;

use crate::error::IngestResult;
use crate::schema::LEDGER_TABLE;

pub const DEFAULT_LIST_LIMIT: i64 = 200;
pub const MAX_LIST_LIMIT: i64 = 1000;

/// Whether `file_name` already has a ledger entry
pub async fn is_imported(conn: &mut PgConnection, file_name: &str) -> IngestResult<bool> {
    let exists = sqlx::query_scalar::<_, bool>(&format!(
        "SELECT EXISTS (SELECT 1 FROM {LEDGER_TABLE} WHERE file_name = $1)"
    ))
    .bind(file_name)
    .fetch_one(conn)
    .await?;
    Ok(exists)
}

/// Insert the completion entry for `file_name`
///
/// Returns `false` when an entry already existed; the existing row is kept.
pub async fn record(conn: &mut PgConnection, file_name: &str, rows_imported: i64) -> IngestResult<bool> {
    let result = sqlx::query(&format!(
        "INSERT INTO {LEDGER_TABLE} (file_name, import_date, rows_imported) \
         VALUES ($1, NOW(), $2) \
         ON CONFLICT (file_name) DO NOTHING"
    ))
    .bind(file_name)
    .bind(rows_imported)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Ledger entries, newest first
pub async fn list_imports(
    pool: &PgPool,
    limit: Option<i64>,
    offset: Option<i64>,
) -> IngestResult<Vec<ImportLogEntry>> {
    let (limit, offset) = page_bounds(limit, offset);

    let rows = sqlx::query_as::<_, (String, DateTime<Utc>, Option<i64>)>(&format!(
        "SELECT file_name, import_date, rows_imported FROM {LEDGER_TABLE} \
         ORDER BY import_date DESC, file_name \
         LIMIT $1 OFFSET $2"
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(file_name, import_date, rows_imported)| ImportLogEntry {
            file_name,
            import_date,
            rows_imported,
        })
        .collect())
}

fn page_bounds(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}
