//! Per-file idempotency and mutual exclusion
//!
//! A file moves through `Unchecked -> AlreadyImported | LockDenied | Acquired`
//! and an acquired lock is always released before the file's outcome is
//! reported. The lock is a session-level Postgres advisory lock keyed by
//! `hashtext(file_name)`, so it lives on the connection that took it and
//! vanishes if that connection drops.

use sqlx::PgConnection;

use crate::error::IngestResult;
use crate::ledger;

/// Result of checking a file before import
#[derive(Debug)]
pub enum Gate {
    /// The ledger already lists the file. No lock was attempted.
    AlreadyImported,
    /// Another session holds the file's lock
    LockDenied,
    Acquired(FileLock),
}

/// Token for a held advisory lock. Release it on the connection that took it.
#[derive(Debug)]
#[must_use = "an acquired lock must be released"]
pub struct FileLock {
    file_name: String,
}

impl FileLock {
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Release the lock, logging instead of failing
    pub async fn release(self, conn: &mut PgConnection) {
        let released = sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock(hashtext($1)::bigint)")
            .bind(&self.file_name)
            .fetch_one(conn)
            .await;

        match released {
            Ok(true) => tracing::debug!(file = %self.file_name, "Released import lock"),
            Ok(false) => tracing::warn!(
                file = %self.file_name,
                "Import lock was not held by this session at release"
            ),
            Err(e) => tracing::warn!(
                file = %self.file_name,
                error = %e,
                "Failed to release import lock"
            ),
        }
    }
}

/// Ledger check, then a non-blocking lock attempt
pub async fn acquire(conn: &mut PgConnection, file_name: &str) -> IngestResult<Gate> {
    if ledger::is_imported(&mut *conn, file_name).await? {
        return Ok(Gate::AlreadyImported);
    }

    let acquired = sqlx::query_scalar::<_, bool>("SELECT pg_try_advisory_lock(hashtext($1)::bigint)")
        .bind(file_name)
        .fetch_one(&mut *conn)
        .await?;

    if !acquired {
        return Ok(Gate::LockDenied);
    }
    let lock = FileLock {
        file_name: file_name.to_string(),
    };

    // A holder may have finished and released between the two checks
    match ledger::is_imported(&mut *conn, file_name).await {
        Ok(false) => {
            tracing::debug!(file = %file_name, "Acquired import lock");
            Ok(Gate::Acquired(lock))
        },
        Ok(true) => {
            lock.release(conn).await;
            Ok(Gate::AlreadyImported)
        },
        Err(e) => {
            lock.release(conn).await;
            Err(e)
        },
    }
}
