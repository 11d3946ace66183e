//! Read-only aggregates over the trip table

use chrono::NaiveDateTime;
use pg_escape::quote_identifier;
use taxi_common::types::{RunStatistics, StoreStatistics};

use crate::db::Store;
use crate::error::IngestResult;
use crate::schema::{AMOUNT_COLUMN, DISTANCE_COLUMN, DROPOFF_COLUMN, PICKUP_COLUMN};

/// Row count, mean distance, and revenue after a run
pub async fn run_statistics(store: &Store) -> IngestResult<RunStatistics> {
    let sql = format!(
        "SELECT COUNT(*), AVG({}), SUM({}) FROM {}",
        quote_identifier(DISTANCE_COLUMN),
        quote_identifier(AMOUNT_COLUMN),
        store.schema().quoted_table()
    );
    let (total_trips, avg_trip_distance, total_revenue) =
        sqlx::query_as::<_, (i64, Option<f64>, Option<f64>)>(&sql)
            .fetch_one(store.pool())
            .await?;

    Ok(RunStatistics {
        total_trips,
        avg_trip_distance,
        total_revenue,
    })
}

pub async fn store_statistics(store: &Store) -> IngestResult<StoreStatistics> {
    let sql = format!(
        "SELECT COUNT(*), MIN({}), MAX({}), AVG({}), AVG({}) FROM {}",
        quote_identifier(PICKUP_COLUMN),
        quote_identifier(DROPOFF_COLUMN),
        quote_identifier(DISTANCE_COLUMN),
        quote_identifier(AMOUNT_COLUMN),
        store.schema().quoted_table()
    );
    let (total_trips, min_pickup, max_dropoff, avg_trip_distance, avg_total_amount) =
        sqlx::query_as::<
            _,
            (
                i64,
                Option<NaiveDateTime>,
                Option<NaiveDateTime>,
                Option<f64>,
                Option<f64>,
            ),
        >(&sql)
        .fetch_one(store.pool())
        .await?;

    Ok(StoreStatistics {
        total_trips,
        min_pickup,
        max_dropoff,
        avg_trip_distance,
        avg_total_amount,
    })
}
