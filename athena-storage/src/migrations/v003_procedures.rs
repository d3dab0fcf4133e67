//! v003: procedures (current heads), procedure_versions (lineage).

use rusqlite::Connection;

use athena_core::errors::AthenaResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> AthenaResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS procedures (
            id                   TEXT PRIMARY KEY,
            name                 TEXT NOT NULL,
            category             TEXT NOT NULL,
            steps                TEXT NOT NULL,
            version              INTEGER NOT NULL DEFAULT 1,
            predecessor_version  TEXT,
            executions           INTEGER NOT NULL DEFAULT 0,
            successes            INTEGER NOT NULL DEFAULT 0,
            context_predicate    TEXT NOT NULL DEFAULT '',
            created_at           TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_procedures_name ON procedures(name);
        CREATE INDEX IF NOT EXISTS idx_procedures_category ON procedures(category);

        CREATE TABLE IF NOT EXISTS procedure_versions (
            id                   TEXT PRIMARY KEY,
            name                 TEXT NOT NULL,
            category             TEXT NOT NULL,
            steps                TEXT NOT NULL,
            version              INTEGER NOT NULL,
            predecessor_version  TEXT,
            executions           INTEGER NOT NULL DEFAULT 0,
            successes            INTEGER NOT NULL DEFAULT 0,
            context_predicate    TEXT NOT NULL DEFAULT '',
            created_at           TEXT NOT NULL,
            superseded_at        TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_procedure_versions_name ON procedure_versions(name, version);
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
