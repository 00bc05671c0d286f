//! Error types for the storage layer.

use thiserror::Error;

/// Errors a [`KvBackend`](crate::KvBackend) can report.
///
/// These never escape [`ScopedStore`](crate::ScopedStore); they are logged
/// and turned into fallbacks or no-ops there.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A SQLite statement failed.
    #[error("store database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No pooled connection could be obtained.
    #[error("store pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// The connection pool could not be created.
    #[error("store pool init error: {0}")]
    PoolInit(#[from] PoolError),

    /// The schema is missing, newer than supported, or failed to install.
    #[error("store schema error: {0}")]
    Migration(#[from] MigrationError),

    /// The backend refused the operation (e.g. a read-only or full store).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur when creating the database pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Failed to build the connection pool.
    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),
}

/// Errors raised while bringing a store file to the current schema.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The schema version could not be read.
    #[error("failed to read store schema version: {0}")]
    Inspect(rusqlite::Error),

    /// Creating the schema failed; the file is left as it was.
    #[error("failed to apply store schema v{version}: {source}")]
    Apply {
        version: i64,
        source: rusqlite::Error,
    },

    /// The file was written by a newer build.
    #[error("store schema v{found} is newer than supported v{supported}")]
    UnsupportedVersion { found: i64, supported: i64 },
}
