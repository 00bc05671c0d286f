//! Pooled SQLite connections for the key-value table.

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};

use crate::error::PoolError;

/// Path that opens a private in-memory database per connection.
pub const IN_MEMORY: &str = ":memory:";

pub type DbPool = Pool<SqliteConnectionManager>;

/// Connection settings for one store file.
///
/// The store holds a few dozen short rows and is touched once per tracked
/// event at most, so a small pool is plenty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorePoolSettings {
    /// How long a statement waits on a lock held by another engine sharing
    /// the file.
    pub busy_timeout: Duration,
    pub max_connections: u32,
    /// How long opening waits for the first connection. An unopenable path
    /// fails after this long, which is what triggers the memory fallback.
    pub open_timeout: Duration,
}

impl Default for StorePoolSettings {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(2_000),
            max_connections: 2,
            open_timeout: Duration::from_millis(1_000),
        }
    }
}

impl StorePoolSettings {
    /// Settings suited to `path`. Each connection to [`IN_MEMORY`] is its
    /// own database, so those pools are capped at one connection.
    pub fn for_path(path: &str) -> Self {
        if path == IN_MEMORY {
            Self {
                max_connections: 1,
                ..Self::default()
            }
        } else {
            Self::default()
        }
    }
}

/// Opens a pool on `path`, creating the file if needed.
///
/// # Errors
///
/// Returns `PoolError::PoolInit` if the first connection cannot be opened
/// within `settings.open_timeout`.
pub fn open_pool(path: &str, settings: StorePoolSettings) -> Result<DbPool, PoolError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

    let manager = SqliteConnectionManager::file(path)
        .with_flags(flags)
        .with_init(move |conn| prepare_connection(conn, settings.busy_timeout));

    let pool = Pool::builder()
        .max_size(settings.max_connections)
        .connection_timeout(settings.open_timeout)
        .build(manager)?;

    Ok(pool)
}

fn prepare_connection(conn: &mut Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    // In-memory databases stay in "memory" mode; a file that refuses WAL
    // still works, with readers blocking writers.
    if mode != "wal" && mode != "memory" {
        tracing::warn!(journal_mode = %mode, "store file is not in WAL mode");
    }
    // Losing the last write on power failure is acceptable for these rows.
    conn.pragma_update(None, "synchronous", "NORMAL")
}
