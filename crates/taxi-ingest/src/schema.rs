//! Declared target table
//!
//! The normalizer and both load strategies work from one [`TableSchema`]: the
//! column names, their order, and their semantic types. The store-assigned
//! `id` column is never part of it.

use std::collections::HashSet;
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use pg_escape::quote_identifier;

use crate::error::{IngestError, IngestResult};

/// Default trip table
pub const TRIPS_TABLE: &str = "yellow_taxi_trips";

/// Ledger of fully imported files
pub const LEDGER_TABLE: &str = "import_log";

/// Measure and time columns read by the statistics queries
pub const PICKUP_COLUMN: &str = "tpep_pickup_datetime";
pub const DROPOFF_COLUMN: &str = "tpep_dropoff_datetime";
pub const DISTANCE_COLUMN: &str = "trip_distance";
pub const AMOUNT_COLUMN: &str = "total_amount";

const RESERVED_ID_COLUMN: &str = "id";

/// Semantic type of a declared column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Int64,
    Float64,
    /// Naive timestamp, microsecond precision
    Timestamp,
    Text,
}

impl ColumnKind {
    /// Arrow type a normalized column of this kind carries
    pub fn arrow_type(self) -> DataType {
        match self {
            ColumnKind::Int64 => DataType::Int64,
            ColumnKind::Float64 => DataType::Float64,
            ColumnKind::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
            ColumnKind::Text => DataType::Utf8,
        }
    }

    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Int64 => "BIGINT",
            ColumnKind::Float64 => "DOUBLE PRECISION",
            ColumnKind::Timestamp => "TIMESTAMP",
            ColumnKind::Text => "TEXT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Target table: name plus ordered column list
#[derive(Debug, Clone)]
pub struct TableSchema {
    table: String,
    columns: Vec<ColumnSpec>,
    arrow: SchemaRef,
}

impl TableSchema {
    /// Build and validate a schema
    pub fn new(table: impl Into<String>, columns: Vec<ColumnSpec>) -> IngestResult<Self> {
        let table = table.into();
        validate(&table, &columns)?;
        Ok(Self::from_parts(table, columns))
    }

    fn from_parts(table: String, columns: Vec<ColumnSpec>) -> Self {
        let fields: Vec<Field> = columns
            .iter()
            .map(|c| Field::new(&c.name, c.kind.arrow_type(), true))
            .collect();
        Self {
            table,
            columns,
            arrow: Arc::new(Schema::new(fields)),
        }
    }

    /// The NYC TLC yellow-cab trip layout
    pub fn yellow_taxi_trips() -> Self {
        use ColumnKind::*;

        let columns = [
            ("VendorID", Int64),
            ("tpep_pickup_datetime", Timestamp),
            ("tpep_dropoff_datetime", Timestamp),
            ("passenger_count", Float64),
            ("trip_distance", Float64),
            ("RatecodeID", Float64),
            ("store_and_fwd_flag", Text),
            ("PULocationID", Int64),
            ("DOLocationID", Int64),
            ("payment_type", Int64),
            ("fare_amount", Float64),
            ("extra", Float64),
            ("mta_tax", Float64),
            ("tip_amount", Float64),
            ("tolls_amount", Float64),
            ("improvement_surcharge", Float64),
            ("total_amount", Float64),
            ("congestion_surcharge", Float64),
            ("Airport_fee", Float64),
        ]
        .into_iter()
        .map(|(name, kind)| ColumnSpec::new(name, kind))
        .collect();

        Self::from_parts(TRIPS_TABLE.to_string(), columns)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Arrow schema every normalized batch conforms to
    pub fn arrow_schema(&self) -> SchemaRef {
        self.arrow.clone()
    }

    pub fn quoted_table(&self) -> String {
        quote_identifier(&self.table).into_owned()
    }

    /// Quoted, comma-separated column list used by both load strategies
    pub fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| quote_identifier(&c.name).into_owned())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn create_table_sql(&self) -> String {
        let mut ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {} BIGSERIAL PRIMARY KEY",
            self.quoted_table(),
            RESERVED_ID_COLUMN
        );
        for column in &self.columns {
            ddl.push_str(",\n    ");
            ddl.push_str(&quote_identifier(&column.name));
            ddl.push(' ');
            ddl.push_str(column.kind.sql_type());
        }
        ddl.push_str("\n)");
        ddl
    }
}

/// DDL for the import ledger
pub fn ledger_table_sql() -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {LEDGER_TABLE} (
            file_name TEXT PRIMARY KEY,
            import_date TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            rows_imported BIGINT
        )
        "#
    )
}

fn validate(table: &str, columns: &[ColumnSpec]) -> IngestResult<()> {
    if table.trim().is_empty() {
        return Err(IngestError::Schema("table name cannot be empty".to_string()));
    }
    if columns.is_empty() {
        return Err(IngestError::Schema(format!("table '{}' declares no columns", table)));
    }

    let mut seen = HashSet::new();
    for column in columns {
        let name = column.name.trim();
        if name.is_empty() {
            return Err(IngestError::Schema(format!(
                "table '{}' has a column with an empty name",
                table
            )));
        }
        if name.eq_ignore_ascii_case(RESERVED_ID_COLUMN) {
            return Err(IngestError::Schema(format!(
                "column '{}' is reserved for the store-assigned identifier",
                name
            )));
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(IngestError::Schema(format!(
                "column '{}' is declared more than once",
                name
            )));
        }
    }

    Ok(())
}
