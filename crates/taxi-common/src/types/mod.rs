//! Records exchanged between the import engine and its callers

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, TaxiError};

/// How a normalized batch is written to the trip table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoadStrategy {
    /// Streaming bulk load (`COPY ... FROM STDIN`)
    #[default]
    Copy,
    /// Paged multi-row `INSERT ... VALUES`
    Values,
}

impl LoadStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadStrategy::Copy => "copy",
            LoadStrategy::Values => "values",
        }
    }
}

impl std::str::FromStr for LoadStrategy {
    type Err = TaxiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "copy" | "bulk" => Ok(LoadStrategy::Copy),
            "values" | "insert" => Ok(LoadStrategy::Values),
            other => Err(TaxiError::UnknownStrategy(other.to_string())),
        }
    }
}

impl std::fmt::Display for LoadStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Ledger and Statistics
// ============================================================================

/// One row of the import ledger.
///
/// A file with an entry here is never imported again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportLogEntry {
    pub file_name: String,
    pub import_date: DateTime<Utc>,
    pub rows_imported: Option<i64>,
}

/// Aggregates reported at the end of an import run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub total_trips: i64,
    pub avg_trip_distance: Option<f64>,
    pub total_revenue: Option<f64>,
}

/// Store-wide statistics over the trip table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStatistics {
    pub total_trips: i64,
    pub min_pickup: Option<NaiveDateTime>,
    pub max_dropoff: Option<NaiveDateTime>,
    pub avg_trip_distance: Option<f64>,
    pub avg_total_amount: Option<f64>,
}

/// Render any result record as indented JSON
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
