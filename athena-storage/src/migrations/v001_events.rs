//! v001: events, archived_events.

use rusqlite::Connection;

use athena_core::errors::AthenaResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> AthenaResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS events (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp_us  INTEGER NOT NULL,
            session_id    TEXT NOT NULL,
            event_type    TEXT NOT NULL,
            description   TEXT NOT NULL,
            context       TEXT NOT NULL DEFAULT '{}',
            outcome       TEXT NOT NULL DEFAULT 'unknown',
            fingerprint   TEXT NOT NULL,
            novelty       REAL NOT NULL DEFAULT 1.0
        );

        CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp_us);
        CREATE INDEX IF NOT EXISTS idx_events_session ON events(session_id);
        CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);
        CREATE INDEX IF NOT EXISTS idx_events_fingerprint ON events(fingerprint);

        CREATE TABLE IF NOT EXISTS archived_events (
            id            INTEGER PRIMARY KEY,
            timestamp_us  INTEGER NOT NULL,
            archived_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            payload       BLOB NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_archived_timestamp ON archived_events(timestamp_us);
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
