//! The `kv_entries` table, versioned through SQLite's `user_version`.
//!
//! Version 0 is an empty file. A file stamped with a version newer than
//! this build understands is refused rather than written to, and the
//! store falls back to memory for that scope.

use rusqlite::{Connection, TransactionBehavior};

use crate::error::MigrationError;

/// Version written by this build.
pub const SCHEMA_VERSION: i64 = 1;

const KV_V1: &str = include_str!("schema/kv_v1.sql");

/// Reads the schema version stamped on the open database.
///
/// # Errors
///
/// Returns `MigrationError::Inspect` if the pragma cannot be read.
pub fn schema_version(conn: &Connection) -> Result<i64, MigrationError> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(MigrationError::Inspect)
}

/// Creates `kv_entries` on an empty database. Returns `true` if this call
/// created it.
///
/// # Errors
///
/// Returns `MigrationError::UnsupportedVersion` for a file written by a
/// newer build, or another variant if SQLite fails.
pub fn ensure_schema(conn: &mut Connection) -> Result<bool, MigrationError> {
    install(conn, KV_V1)
}

fn install(conn: &mut Connection, sql: &str) -> Result<bool, MigrationError> {
    if schema_version(conn)? == SCHEMA_VERSION {
        return Ok(false);
    }

    let apply = |source| MigrationError::Apply {
        version: SCHEMA_VERSION,
        source,
    };
    // Immediate, so two engines opening the same file do not both create
    // the table.
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(apply)?;
    match schema_version(&tx)? {
        SCHEMA_VERSION => return Ok(false),
        0 => {}
        found => {
            return Err(MigrationError::UnsupportedVersion {
                found,
                supported: SCHEMA_VERSION,
            })
        }
    }
    tx.execute_batch(sql).map_err(apply)?;
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)
        .map_err(apply)?;
    tx.commit().map_err(apply)?;

    tracing::debug!(version = SCHEMA_VERSION, "created store schema");
    Ok(true)
}
