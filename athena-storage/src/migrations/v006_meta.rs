//! v006: meta_metrics.

use rusqlite::Connection;

use athena_core::errors::AthenaResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> AthenaResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS meta_metrics (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            layer       TEXT NOT NULL,
            domain      TEXT NOT NULL DEFAULT '',
            metric      TEXT NOT NULL,
            value       REAL NOT NULL,
            updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_meta_layer_domain ON meta_metrics(layer, domain);
        CREATE INDEX IF NOT EXISTS idx_meta_metric ON meta_metrics(metric);
        CREATE INDEX IF NOT EXISTS idx_meta_updated ON meta_metrics(updated_at);
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
