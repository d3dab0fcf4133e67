//! v002: facts, fact_fts (FTS5), fact_embeddings.

use rusqlite::Connection;

use athena_core::errors::AthenaResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> AthenaResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS facts (
            id                   TEXT PRIMARY KEY,
            content              TEXT NOT NULL,
            domain               TEXT NOT NULL,
            confidence           REAL NOT NULL DEFAULT 0.5,
            support_count        INTEGER NOT NULL DEFAULT 0,
            contradiction_count  INTEGER NOT NULL DEFAULT 0,
            usefulness           REAL NOT NULL DEFAULT 0.0,
            created_at           TEXT NOT NULL,
            last_used_at         TEXT NOT NULL,
            source_event_ids     TEXT NOT NULL DEFAULT '[]',
            content_hash         TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_facts_hash ON facts(content_hash);
        CREATE INDEX IF NOT EXISTS idx_facts_domain ON facts(domain);
        CREATE INDEX IF NOT EXISTS idx_facts_confidence ON facts(confidence);

        CREATE VIRTUAL TABLE IF NOT EXISTS fact_fts USING fts5(
            content,
            domain UNINDEXED
        );

        CREATE TABLE IF NOT EXISTS fact_embeddings (
            fact_id     TEXT PRIMARY KEY,
            embedding   BLOB NOT NULL,
            dimensions  INTEGER NOT NULL
        );
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
