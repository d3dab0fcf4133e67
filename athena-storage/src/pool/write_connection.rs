//! The single logical writer lane. All writes to a store serialise here.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

use athena_core::errors::AthenaResult;

use super::pragmas::apply_pragmas;
use crate::to_storage_err;

/// Wraps the one write connection behind a mutex. No suspension point ever
/// holds this lock; closures passed in must not block on external calls.
#[derive(Debug)]
pub struct WriteConnection {
    conn: Mutex<Connection>,
}

impl WriteConnection {
    pub fn open(path: &Path) -> AthenaResult<Self> {
        let conn = Connection::open(path).map_err(|e| to_storage_err(e.to_string()))?;
        apply_pragmas(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> AthenaResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| to_storage_err(e.to_string()))?;
        apply_pragmas(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Execute a closure with the write connection.
    pub fn with_conn_sync<F, T>(&self, f: F) -> AthenaResult<T>
    where
        F: FnOnce(&Connection) -> AthenaResult<T>,
    {
        let guard = self
            .conn
            .lock()
            .map_err(|e| to_storage_err(format!("write connection lock poisoned: {e}")))?;
        f(&guard)
    }
}
