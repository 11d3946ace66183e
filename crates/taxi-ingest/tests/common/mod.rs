//! Shared harness for store-backed import tests
//!
//! Each test starts its own PostgreSQL container and gets a [`Store`] with
//! the trip and ledger tables created. Parquet fixtures are written with the
//! `parquet` crate into a temporary directory.

#![allow(dead_code)]

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use taxi_common::types::LoadStrategy;
use taxi_ingest::{DatabaseConfig, RunOptions, Store, TableSchema};
use testcontainers::core::IntoContainerPort;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;

/// 2025-01-01 00:00:00 UTC
const BASE_PICKUP_MICROS: i64 = 1_735_689_600_000_000;

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,taxi_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    store: Store,
    connection_string: String,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container.get_host().await.context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;
        let connection_string = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        let config = DatabaseConfig {
            url: connection_string.clone(),
            max_connections: 4,
            connect_timeout_secs: 30,
        };
        let store = Store::connect(&config, Arc::new(TableSchema::yellow_taxi_trips())).await?;
        store.ensure_tables().await?;

        Ok(Self {
            _container: container,
            store,
            connection_string,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn pool(&self) -> &PgPool {
        self.store.pool()
    }

    /// A pool independent of the store, standing in for another process
    pub async fn second_client(&self) -> Result<PgPool> {
        Ok(PgPoolOptions::new()
            .max_connections(1)
            .connect(&self.connection_string)
            .await?)
    }

    pub async fn trip_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM yellow_taxi_trips")
            .fetch_one(self.pool())
            .await?)
    }

    pub async fn ledger_rows(&self, file_name: &str) -> Result<Option<Option<i64>>> {
        Ok(
            sqlx::query_scalar::<_, Option<i64>>("SELECT rows_imported FROM import_log WHERE file_name = $1")
                .bind(file_name)
                .fetch_optional(self.pool())
                .await?,
        )
    }

    /// Kill another session's backend, as a dropped network link would
    pub async fn terminate_backend(&self, pid: i32) -> Result<()> {
        let killer = self.second_client().await?;
        let terminated: bool = sqlx::query_scalar("SELECT pg_terminate_backend($1)")
            .bind(pid)
            .fetch_one(&killer)
            .await?;
        anyhow::ensure!(terminated, "backend {} was not terminated", pid);
        Ok(())
    }

    /// Whether another session could take the file's advisory lock right now
    pub async fn lock_is_free(&self, file_name: &str) -> Result<bool> {
        let other = self.second_client().await?;
        let mut conn = other.acquire().await?;
        let free: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock(hashtext($1)::bigint)")
            .bind(file_name)
            .fetch_one(&mut *conn)
            .await?;
        if free {
            sqlx::query("SELECT pg_advisory_unlock(hashtext($1)::bigint)")
                .bind(file_name)
                .execute(&mut *conn)
                .await?;
        }
        Ok(free)
    }

    pub async fn ledger_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM import_log")
            .fetch_one(self.pool())
            .await?)
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn run_options(dir: &Path, batch_size: usize) -> RunOptions {
    RunOptions {
        data_dir: dir.to_path_buf(),
        recursive: true,
        dry_run: false,
        strategy: LoadStrategy::Copy,
        batch_size,
        insert_page_size: 1_000,
        max_files: None,
        start_with: None,
        progress: false,
    }
}

/// Write `rows` trips shaped like a TLC file
///
/// `passenger_count` is stored as text so individual cells can carry a
/// non-numeric token: every `na_every`-th row holds "N/A". The file also
/// carries a column the trip table does not declare.
pub fn write_trip_file(path: &Path, rows: usize, na_every: Option<usize>) -> Result<()> {
    write_trip_rows(
        path,
        rows,
        |i| match na_every {
            Some(n) if i % n == 0 => "N/A".to_string(),
            _ => ((i % 4) + 1).to_string(),
        },
        |i| (if i % 7 == 0 { "Y" } else { "N" }).to_string(),
    )
}

/// Like [`write_trip_file`] with caller-chosen passenger and flag cells
pub fn write_trip_rows(
    path: &Path,
    rows: usize,
    passenger: impl Fn(usize) -> String,
    flag: impl Fn(usize) -> String,
) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("VendorID", DataType::Int64, true),
        Field::new(
            "tpep_pickup_datetime",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            true,
        ),
        Field::new(
            "tpep_dropoff_datetime",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            true,
        ),
        Field::new("passenger_count", DataType::Utf8, true),
        Field::new("trip_distance", DataType::Float64, true),
        Field::new("store_and_fwd_flag", DataType::Utf8, true),
        Field::new("total_amount", DataType::Float64, true),
        Field::new("cbd_congestion_fee", DataType::Float64, true),
    ]));

    let pickups: Vec<i64> = (0..rows as i64)
        .map(|i| BASE_PICKUP_MICROS + i * 60_000_000)
        .collect();
    let passengers: Vec<String> = (0..rows).map(passenger).collect();
    let flags: Vec<String> = (0..rows).map(flag).collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values((0..rows as i64).map(|i| i % 2 + 1))),
        Arc::new(TimestampMicrosecondArray::from(pickups.clone())),
        Arc::new(TimestampMicrosecondArray::from(
            pickups.iter().map(|p| p + 900_000_000).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(passengers)),
        Arc::new(Float64Array::from_iter_values((0..rows).map(|i| 0.5 + i as f64 * 0.25))),
        Arc::new(StringArray::from(flags)),
        Arc::new(Float64Array::from_iter_values((0..rows).map(|i| 10.0 + (i % 13) as f64))),
        Arc::new(Float64Array::from_iter_values((0..rows).map(|_| 0.75))),
    ];

    let batch = RecordBatch::try_new(schema.clone(), columns)?;
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}
