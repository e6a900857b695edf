use rusqlite::{Connection, Result};

/// Initialise UserContext tables. Safe to call on every startup (idempotent),
/// following the teacher's `skynet-memory::db::init_db`.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_user_context_table(conn)
}

fn create_user_context_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS user_context (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     TEXT NOT NULL,
            key         TEXT NOT NULL,
            value       TEXT NOT NULL,
            source      TEXT NOT NULL,
            confidence  REAL NOT NULL DEFAULT 0.8,
            updated_at  TEXT NOT NULL,
            UNIQUE(user_id, key)
        );
        CREATE INDEX IF NOT EXISTS idx_context_user
            ON user_context(user_id);",
    )
}
