//! v004: tasks, task_triggers.

use rusqlite::Connection;

use athena_core::errors::AthenaResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> AthenaResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS tasks (
            id            TEXT PRIMARY KEY,
            title         TEXT NOT NULL,
            status        TEXT NOT NULL DEFAULT 'pending',
            priority      TEXT NOT NULL DEFAULT 'medium',
            created_at    TEXT NOT NULL,
            deadline      TEXT,
            completed_at  TEXT,
            dependencies  TEXT NOT NULL DEFAULT '[]'
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
        CREATE INDEX IF NOT EXISTS idx_tasks_priority ON tasks(priority);

        CREATE TABLE IF NOT EXISTS task_triggers (
            task_id    TEXT NOT NULL,
            kind       TEXT NOT NULL,
            predicate  TEXT NOT NULL,
            PRIMARY KEY (task_id, kind, predicate),
            FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_task_triggers_kind ON task_triggers(kind);
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
