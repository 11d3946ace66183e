//! Store-backed import pipeline tests
//!
//! Covers:
//! 1. Batched import and ledger bookkeeping
//! 2. Idempotent re-runs
//! 3. Lock contention with another session
//! 4. Dry runs leaving the store untouched
//! 5. Value coercion and strategy equivalence
//! 6. Failure containment, session recovery, and the read-only queries

mod common;

use anyhow::Result;
use common::{init_tracing, run_options, write_trip_file, write_trip_rows, TestPostgres};
use serial_test::serial;
use taxi_common::types::LoadStrategy;
use taxi_ingest::{ledger, run_import, stats, FileOutcome, RunOptions};

const JANUARY: &str = "yellow_tripdata_2025-01.parquet";
const FEBRUARY: &str = "yellow_tripdata_2025-02.parquet";

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_batched_import_writes_one_ledger_entry() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let dir = tempfile::tempdir()?;
    write_trip_file(&dir.path().join(JANUARY), 250, None)?;

    let summary = run_import(pg.store(), &run_options(dir.path(), 100)).await?;

    assert_eq!(summary.files_found, 1);
    assert_eq!(summary.imported_files, 1);
    assert_eq!(
        summary.files[0].outcome,
        FileOutcome::Imported { rows: 250, batches: 3 }
    );
    assert_eq!(pg.trip_count().await?, 250);
    assert_eq!(pg.ledger_rows(JANUARY).await?, Some(Some(250)));
    assert_eq!(summary.stats.total_trips, 250);
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_rerun_skips_imported_files() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let dir = tempfile::tempdir()?;
    write_trip_file(&dir.path().join(JANUARY), 120, None)?;
    write_trip_file(&dir.path().join(FEBRUARY), 80, None)?;
    let options = run_options(dir.path(), 50);

    let first = run_import(pg.store(), &options).await?;
    assert_eq!(first.imported_files, 2);
    let rows_after_first = pg.trip_count().await?;
    assert_eq!(rows_after_first, 200);

    let second = run_import(pg.store(), &options).await?;
    assert_eq!(second.imported_files, 0);
    assert_eq!(second.skipped_files, 2);
    assert!(second
        .files
        .iter()
        .all(|f| f.outcome == FileOutcome::AlreadyImported));
    assert_eq!(pg.trip_count().await?, rows_after_first);
    assert_eq!(pg.ledger_count().await?, 2);
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_held_lock_denies_import() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let dir = tempfile::tempdir()?;
    write_trip_file(&dir.path().join(JANUARY), 40, None)?;

    // Another session holds the file's lock
    let other = pg.second_client().await?;
    let mut other_conn = other.acquire().await?;
    let held: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock(hashtext($1)::bigint)")
        .bind(JANUARY)
        .fetch_one(&mut *other_conn)
        .await?;
    assert!(held);

    let denied = run_import(pg.store(), &run_options(dir.path(), 10)).await?;
    assert_eq!(denied.locked_files, 1);
    assert_eq!(denied.files[0].outcome, FileOutcome::LockDenied);
    assert_eq!(pg.trip_count().await?, 0);
    assert_eq!(pg.ledger_rows(JANUARY).await?, None);

    let released: bool = sqlx::query_scalar("SELECT pg_advisory_unlock(hashtext($1)::bigint)")
        .bind(JANUARY)
        .fetch_one(&mut *other_conn)
        .await?;
    assert!(released);

    let retried = run_import(pg.store(), &run_options(dir.path(), 10)).await?;
    assert_eq!(retried.imported_files, 1);
    assert_eq!(pg.trip_count().await?, 40);
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_dry_run_leaves_store_untouched() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let dir = tempfile::tempdir()?;
    write_trip_file(&dir.path().join(JANUARY), 250, None)?;

    for batch_size in [1, 100, 1_000] {
        let options = RunOptions {
            dry_run: true,
            ..run_options(dir.path(), batch_size)
        };
        let summary = run_import(pg.store(), &options).await?;

        assert_eq!(summary.validated_files, 1);
        assert_eq!(summary.imported_files, 0);
        assert_eq!(
            summary.files[0].outcome,
            FileOutcome::Validated {
                rows: batch_size.min(250) as u64
            }
        );
        assert_eq!(pg.trip_count().await?, 0);
        assert_eq!(pg.ledger_count().await?, 0);
    }
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_non_numeric_tokens_load_as_null() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let dir = tempfile::tempdir()?;
    write_trip_file(&dir.path().join(JANUARY), 1000, Some(100))?;

    let summary = run_import(pg.store(), &run_options(dir.path(), 1000)).await?;
    assert_eq!(summary.imported_files, 1);
    assert_eq!(pg.trip_count().await?, 1000);

    let nulls: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM yellow_taxi_trips WHERE passenger_count IS NULL")
            .fetch_one(pg.pool())
            .await?;
    assert_eq!(nulls, 10);

    // Undeclared source columns are dropped, undeclared table columns stay null
    let fare_nulls: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM yellow_taxi_trips WHERE fare_amount IS NULL")
            .fetch_one(pg.pool())
            .await?;
    assert_eq!(fare_nulls, 1000);
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_values_strategy_stores_same_rows_as_copy() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let copy_dir = tempfile::tempdir()?;
    let values_dir = tempfile::tempdir()?;
    let passenger = |i: usize| if i % 7 == 0 { "N/A".to_string() } else { (i % 4).to_string() };
    // Postgres text cannot hold NUL; both strategies must store "Y"
    let flag = |i: usize| (if i % 5 == 0 { "Y\0" } else { "N" }).to_string();
    write_trip_rows(&copy_dir.path().join(JANUARY), 300, passenger, flag)?;
    write_trip_rows(&values_dir.path().join(FEBRUARY), 300, passenger, flag)?;

    let copied = run_import(pg.store(), &run_options(copy_dir.path(), 128)).await?;
    assert_eq!(copied.imported_files, 1);

    let options = RunOptions {
        strategy: LoadStrategy::Values,
        insert_page_size: 37,
        ..run_options(values_dir.path(), 128)
    };
    let inserted = run_import(pg.store(), &options).await?;
    assert_eq!(inserted.imported_files, 1);
    assert_eq!(pg.trip_count().await?, 600);

    let columns = pg.store().schema().column_list();
    let differing: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM (
            (SELECT {columns} FROM yellow_taxi_trips WHERE id <= 300)
            EXCEPT ALL
            (SELECT {columns} FROM yellow_taxi_trips WHERE id > 300)
        ) AS only_in_copy"
    ))
    .fetch_one(pg.pool())
    .await?;
    assert_eq!(differing, 0);

    let flagged: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM yellow_taxi_trips WHERE store_and_fwd_flag = 'Y'")
            .fetch_one(pg.pool())
            .await?;
    assert_eq!(flagged, 120);
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_unreadable_file_fails_without_stopping_run() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("yellow_tripdata_2024-12.parquet"), b"not parquet")?;
    write_trip_file(&dir.path().join(JANUARY), 30, None)?;

    let summary = run_import(pg.store(), &run_options(dir.path(), 10)).await?;
    assert_eq!(summary.failed_files, 1);
    assert_eq!(summary.imported_files, 1);
    assert!(matches!(summary.files[0].outcome, FileOutcome::Failed { .. }));
    assert_eq!(pg.ledger_rows("yellow_tripdata_2024-12.parquet").await?, None);

    // The failed file's lock was released
    let other = pg.second_client().await?;
    let free: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock(hashtext($1)::bigint)")
        .bind("yellow_tripdata_2024-12.parquet")
        .fetch_one(&other)
        .await?;
    assert!(free);
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_read_only_queries() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let dir = tempfile::tempdir()?;
    write_trip_file(&dir.path().join(JANUARY), 60, None)?;
    run_import(pg.store(), &run_options(dir.path(), 25)).await?;
    write_trip_file(&dir.path().join(FEBRUARY), 40, None)?;
    run_import(pg.store(), &run_options(dir.path(), 25)).await?;

    let entries = ledger::list_imports(pg.pool(), None, None).await?;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].file_name, FEBRUARY);
    assert_eq!(entries[0].rows_imported, Some(40));
    assert!(entries[0].import_date >= entries[1].import_date);

    let paged = ledger::list_imports(pg.pool(), Some(1), Some(1)).await?;
    assert_eq!(paged.len(), 1);
    assert_eq!(paged[0].file_name, JANUARY);

    let store_stats = stats::store_statistics(pg.store()).await?;
    assert_eq!(store_stats.total_trips, 100);
    assert!(store_stats.min_pickup.is_some());
    assert!(store_stats.max_dropoff > store_stats.min_pickup);
    assert!(store_stats.avg_trip_distance.is_some());
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_failed_batch_keeps_earlier_batches_and_frees_lock() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    sqlx::query(
        "ALTER TABLE yellow_taxi_trips ADD CONSTRAINT passenger_cap CHECK (passenger_count < 100)",
    )
    .execute(pg.pool())
    .await?;

    let dir = tempfile::tempdir()?;
    let rejected = "yellow_tripdata_2024-12.parquet";
    // Row 15 sits in the second batch of ten
    write_trip_rows(
        &dir.path().join(rejected),
        30,
        |i| if i == 15 { "150".to_string() } else { "1".to_string() },
        |_| "N".to_string(),
    )?;
    write_trip_file(&dir.path().join(JANUARY), 20, None)?;

    let summary = run_import(pg.store(), &run_options(dir.path(), 10)).await?;

    assert_eq!(summary.files_found, 2);
    assert_eq!(summary.failed_files, 1);
    assert_eq!(summary.files[0].file, rejected);
    match &summary.files[0].outcome {
        FileOutcome::Failed { reason } => assert!(reason.contains("passenger_cap"), "{}", reason),
        other => panic!("expected a failed file, got {:?}", other),
    }

    // First batch committed, second rolled back, third never attempted
    assert_eq!(summary.imported_files, 1);
    assert_eq!(
        summary.files[1].outcome,
        FileOutcome::Imported { rows: 20, batches: 2 }
    );
    assert_eq!(pg.trip_count().await?, 10 + 20);
    assert_eq!(pg.ledger_rows(rejected).await?, None);
    assert_eq!(pg.ledger_rows(JANUARY).await?, Some(Some(20)));
    assert!(pg.lock_is_free(rejected).await?);
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_lost_session_is_replaced() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let mut conn = pg.store().acquire().await?;

    assert!(!pg.store().recover_session(&mut conn).await);

    let pid: i32 = sqlx::query_scalar("SELECT pg_backend_pid()")
        .fetch_one(&mut *conn)
        .await?;
    pg.terminate_backend(pid).await?;

    assert!(pg.store().recover_session(&mut conn).await);
    let new_pid: i32 = sqlx::query_scalar("SELECT pg_backend_pid()")
        .fetch_one(&mut *conn)
        .await?;
    assert_ne!(new_pid, pid);

    // The replacement session can run an import
    let dir = tempfile::tempdir()?;
    write_trip_file(&dir.path().join(JANUARY), 15, None)?;
    drop(conn);
    let summary = run_import(pg.store(), &run_options(dir.path(), 10)).await?;
    assert_eq!(summary.imported_files, 1);
    Ok(())
}
