//! Taxi Common Library
//!
//! Shared types, logging, and error handling for the trip-record import tools.
//!
//! # Overview
//!
//! - **Error Handling**: [`TaxiError`] and the [`Result`] alias
//! - **Logging**: tracing subscriber setup driven by [`logging::LogConfig`]
//! - **Types**: records exchanged between the import engine and the layers
//!   built on top of it (loading strategy, ledger entries, statistics)
//!
//! # Example
//!
//! ```no_run
//! use taxi_common::types::LoadStrategy;
//!
//! fn pick(method: &str) -> taxi_common::Result<LoadStrategy> {
//!     method.parse()
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Result, TaxiError};
