//! v005: entities, edges, communities.

use rusqlite::Connection;

use athena_core::errors::AthenaResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> AthenaResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS entities (
            id           TEXT PRIMARY KEY,
            entity_type  TEXT NOT NULL,
            name         TEXT NOT NULL,
            properties   TEXT NOT NULL DEFAULT '{}',
            created_at   TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_entities_type_name ON entities(entity_type, name);

        CREATE TABLE IF NOT EXISTS edges (
            source_id  TEXT NOT NULL,
            target_id  TEXT NOT NULL,
            edge_type  TEXT NOT NULL,
            strength   REAL NOT NULL DEFAULT 1.0,
            context    TEXT,
            PRIMARY KEY (source_id, target_id, edge_type),
            FOREIGN KEY (source_id) REFERENCES entities(id) ON DELETE CASCADE,
            FOREIGN KEY (target_id) REFERENCES entities(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
        CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);

        CREATE TABLE IF NOT EXISTS communities (
            id          TEXT PRIMARY KEY,
            level       INTEGER NOT NULL,
            members     TEXT NOT NULL DEFAULT '[]',
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_communities_level ON communities(level);
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
