//! Import configuration
//!
//! Values come from a `.env` file (if present) and then the process
//! environment. The CLI overrides individual fields per invocation.

use std::path::PathBuf;
use std::str::FromStr;

use taxi_common::types::LoadStrategy;

use crate::db::DatabaseConfig;
use crate::error::{IngestError, IngestResult};
use crate::loader::DEFAULT_INSERT_PAGE_SIZE;

pub const DEFAULT_BATCH_SIZE: usize = 200_000;

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub database: DatabaseConfig,
    pub data_dir: PathBuf,
    pub batch_size: usize,
    pub method: LoadStrategy,
    /// Rows per INSERT statement for the values strategy
    pub insert_page_size: usize,
    pub recursive: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            data_dir: PathBuf::from("data"),
            batch_size: DEFAULT_BATCH_SIZE,
            method: LoadStrategy::default(),
            insert_page_size: DEFAULT_INSERT_PAGE_SIZE,
            recursive: true,
        }
    }
}

impl IngestConfig {
    /// Load `.env`, then read the environment
    pub fn load() -> IngestResult<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> IngestResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let url = match get("DATABASE_URL") {
            Some(url) => url,
            None => match get("PG_HOST") {
                Some(host) => {
                    let port = get("PG_PORT").unwrap_or_else(|| "5432".to_string());
                    let db = get("PG_DB").unwrap_or_default();
                    let user = get("PG_USER").unwrap_or_default();
                    let password = get("PG_PASSWORD").unwrap_or_default();
                    format!("postgresql://{}:{}@{}:{}/{}", user, password, host, port, db)
                },
                None => defaults.database.url.clone(),
            },
        };

        let config = Self {
            database: DatabaseConfig {
                url,
                max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", defaults.database.max_connections)?,
                connect_timeout_secs: parse_or(
                    &get,
                    "DATABASE_CONNECT_TIMEOUT",
                    defaults.database.connect_timeout_secs,
                )?,
            },
            data_dir: get("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            batch_size: parse_or(&get, "IMPORT_BATCH_SIZE", defaults.batch_size)?,
            method: match get("IMPORT_METHOD") {
                Some(method) => method.parse()?,
                None => defaults.method,
            },
            insert_page_size: parse_or(&get, "IMPORT_INSERT_PAGE_SIZE", defaults.insert_page_size)?,
            recursive: parse_or(&get, "IMPORT_RECURSIVE", defaults.recursive)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> IngestResult<()> {
        if self.database.url.trim().is_empty() {
            return Err(IngestError::config("database URL cannot be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(IngestError::config("DATABASE_MAX_CONNECTIONS must be greater than 0"));
        }
        if self.batch_size == 0 {
            return Err(IngestError::config("IMPORT_BATCH_SIZE must be greater than 0"));
        }
        if self.insert_page_size == 0 {
            return Err(IngestError::config("IMPORT_INSERT_PAGE_SIZE must be greater than 0"));
        }
        Ok(())
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> IngestResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| IngestError::config(format!("{} has invalid value '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}
