use rusqlite::{Connection, Result};

/// Initialize activity log tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_activity_log_table(conn)
}

fn create_activity_log_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS activity_log (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     TEXT,
            event_type  TEXT NOT NULL,
            summary     TEXT NOT NULL,
            metadata    TEXT NOT NULL DEFAULT '{}',
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_activity_user_type
            ON activity_log(user_id, event_type, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_activity_created
            ON activity_log(created_at DESC);",
    )
}
