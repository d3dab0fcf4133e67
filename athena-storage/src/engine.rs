//! StorageEngine: owns the ConnectionPool, runs migrations and the
//! integrity check on open, and gates all writes behind the read-only
//! corruption latch.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use rusqlite::Connection;
use tracing::error;

use athena_core::errors::{AthenaError, AthenaResult};

use crate::migrations;
use crate::pool::ConnectionPool;
use crate::to_storage_err;

/// The main storage engine. Each logical store owns its rows exclusively;
/// all of them share this engine's writer lane and read pool.
#[derive(Debug)]
pub struct StorageEngine {
    pool: ConnectionPool,
    /// When true, use the read pool for read operations (file-backed mode).
    /// When false, route all reads through the writer (in-memory mode,
    /// because in-memory read pool connections are isolated databases).
    use_read_pool: bool,
    /// Set on corruption. Writes fail with `CorruptState` until manual
    /// intervention; reads stay available.
    read_only: AtomicBool,
}

impl StorageEngine {
    /// Open a storage engine backed by a file on disk.
    pub fn open(path: &Path, embedding_dimension: usize) -> AthenaResult<Self> {
        let pool = ConnectionPool::open(path, 4)?;
        let engine = Self {
            pool,
            use_read_pool: true,
            read_only: AtomicBool::new(false),
        };
        engine.initialize(embedding_dimension)?;
        Ok(engine)
    }

    /// Open an in-memory storage engine (for testing). Routes all reads
    /// through the writer since in-memory read pool connections are isolated
    /// databases that can't see the writer's changes.
    pub fn open_in_memory(embedding_dimension: usize) -> AthenaResult<Self> {
        let pool = ConnectionPool::open_in_memory(1)?;
        let engine = Self {
            pool,
            use_read_pool: false,
            read_only: AtomicBool::new(false),
        };
        engine.initialize(embedding_dimension)?;
        Ok(engine)
    }

    fn initialize(&self, embedding_dimension: usize) -> AthenaResult<()> {
        self.pool.writer.with_conn_sync(|conn| {
            integrity_check(conn)?;
            migrations::run_migrations(conn, embedding_dimension)?;
            Ok(())
        })
    }

    /// Execute a read-only query on the best available connection.
    /// File-backed: uses the read pool (no writer contention).
    /// In-memory: uses the writer (read pool is isolated).
    pub fn with_reader<F, T>(&self, f: F) -> AthenaResult<T>
    where
        F: FnOnce(&Connection) -> AthenaResult<T>,
    {
        if self.use_read_pool {
            self.pool.readers.with_conn(f)
        } else {
            self.pool.writer.with_conn_sync(f)
        }
    }

    /// Execute a write on the single writer lane. Fails with `CorruptState`
    /// once the corruption latch is set, and sets the latch when the closure
    /// itself reports corruption.
    pub fn with_writer<F, T>(&self, f: F) -> AthenaResult<T>
    where
        F: FnOnce(&Connection) -> AthenaResult<T>,
    {
        if self.read_only.load(Ordering::Acquire) {
            return Err(AthenaError::CorruptState {
                details: "store is read-only after corruption; restore required".into(),
            });
        }
        let result = self.pool.writer.with_conn_sync(f);
        if let Err(AthenaError::CorruptState { ref details }) = result {
            error!(details, "corruption detected, latching store read-only");
            self.read_only.store(true, Ordering::Release);
        }
        result
    }

    /// Whether the corruption latch is set.
    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Acquire)
    }

    /// Get a reference to the connection pool (for advanced operations).
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

/// Quick integrity check on open. A non-ok result marks the database
/// corrupt before any operation runs.
fn integrity_check(conn: &Connection) -> AthenaResult<()> {
    let result: String = conn
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .map_err(|e| to_storage_err(e.to_string()))?;
    if result.eq_ignore_ascii_case("ok") {
        Ok(())
    } else {
        Err(AthenaError::CorruptState { details: result })
    }
}
