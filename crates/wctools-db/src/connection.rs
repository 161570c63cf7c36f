//! Per-call connection opening and configuration.

use std::path::Path;

use rusqlite::{Connection, OpenFlags};

use crate::error::StoreError;

/// Options controlling store construction and connection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Drop every user table before applying the registry on construction.
    pub wipe_on_init: bool,

    /// Busy timeout for SQLite connections, in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            wipe_on_init: true,
            busy_timeout_ms: 5_000,
        }
    }
}

/// Opens a fresh connection to the database file at `path`.
///
/// The file is created if it does not exist. Foreign keys are enabled and
/// the busy timeout from `options` is applied.
///
/// # Errors
///
/// Returns `StoreError::Open` if the file cannot be opened or the
/// connection pragmas are rejected.
pub fn open_connection(path: &Path, options: &StoreOptions) -> Result<Connection, StoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;

    let open_err = |source| StoreError::Open {
        path: path.to_path_buf(),
        source,
    };

    let conn = Connection::open_with_flags(path, flags).map_err(open_err)?;
    conn.execute_batch(&format!(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = {};",
        options.busy_timeout_ms
    ))
    .map_err(open_err)?;

    Ok(conn)
}
