//! Forward-only numbered migrations with a schema_migrations ledger and an
//! embedding-dimension marker. Migrations never run out of order and are
//! never rolled back.

pub mod v001_events;
pub mod v002_facts;
pub mod v003_procedures;
pub mod v004_tasks;
pub mod v005_graph;
pub mod v006_meta;

use rusqlite::{params, Connection};
use tracing::info;

use athena_core::errors::{AthenaError, AthenaResult};

use crate::to_storage_err;

/// Marker key under which the embedding dimension is pinned at first open.
const DIMENSION_MARKER: &str = "embedding_dimension";

type Migration = (u32, &'static str, fn(&Connection) -> AthenaResult<()>);

const MIGRATIONS: &[Migration] = &[
    (1, "events", v001_events::migrate),
    (2, "facts", v002_facts::migrate),
    (3, "procedures", v003_procedures::migrate),
    (4, "tasks", v004_tasks::migrate),
    (5, "graph", v005_graph::migrate),
    (6, "meta", v006_meta::migrate),
];

/// Run all pending migrations, then verify the embedding-dimension marker.
/// Changing the dimension after first open requires a full re-embed and is
/// rejected here.
pub fn run_migrations(conn: &Connection, embedding_dimension: usize) -> AthenaResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY,
            name        TEXT NOT NULL,
            applied_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );
        CREATE TABLE IF NOT EXISTS config_markers (
            key    TEXT PRIMARY KEY,
            value  TEXT NOT NULL
        );",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| to_storage_err(e.to_string()))?;

    for (version, name, migrate) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        migrate(conn)?;
        conn.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![version, name],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
        info!(version, name, "applied migration");
    }

    verify_dimension_marker(conn, embedding_dimension)
}

fn verify_dimension_marker(conn: &Connection, dimension: usize) -> AthenaResult<()> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM config_markers WHERE key = ?1",
            params![DIMENSION_MARKER],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(to_storage_err(other.to_string())),
        })?;

    match stored {
        None => {
            conn.execute(
                "INSERT INTO config_markers (key, value) VALUES (?1, ?2)",
                params![DIMENSION_MARKER, dimension.to_string()],
            )
            .map_err(|e| to_storage_err(e.to_string()))?;
            Ok(())
        }
        Some(v) if v == dimension.to_string() => Ok(()),
        Some(v) => Err(AthenaError::invalid(
            "embedding_dimension",
            format!("configured {dimension} but database was embedded at {v}; a full re-embed is required"),
        )),
    }
}

/// Highest applied migration version.
pub fn current_version(conn: &Connection) -> AthenaResult<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| to_storage_err(e.to_string()))
}
