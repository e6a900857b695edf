use rusqlite::{Connection, Result};

/// Initialise content-cache tables. Safe to call on every startup
/// (idempotent), following the teacher's `skynet-memory::db::init_db`.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_platform_content_table(conn)?;
    create_sync_registry_table(conn)?;
    create_landscape_table(conn)?;
    Ok(())
}

fn create_platform_content_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS platform_content (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id          TEXT NOT NULL,
            platform         TEXT NOT NULL,
            resource_id      TEXT NOT NULL,
            external_id      TEXT NOT NULL,
            content          TEXT NOT NULL,
            content_type     TEXT NOT NULL,
            metadata         TEXT NOT NULL DEFAULT '{}',
            source_timestamp TEXT,
            fetched_at       TEXT NOT NULL,
            retained         INTEGER NOT NULL DEFAULT 0,
            expires_at       TEXT NOT NULL,
            UNIQUE(user_id, platform, resource_id, external_id)
        );
        CREATE INDEX IF NOT EXISTS idx_content_user_platform
            ON platform_content(user_id, platform, resource_id);
        CREATE INDEX IF NOT EXISTS idx_content_liveness
            ON platform_content(retained, expires_at);",
    )
}

fn create_sync_registry_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sync_registry (
            user_id          TEXT NOT NULL,
            platform         TEXT NOT NULL,
            resource_id      TEXT NOT NULL,
            last_synced_at   TEXT NOT NULL,
            item_count       INTEGER NOT NULL DEFAULT 0,
            source_latest_at TEXT,
            cursor           TEXT,
            PRIMARY KEY (user_id, platform, resource_id)
        );",
    )
}

fn create_landscape_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS landscape (
            connection_id    TEXT PRIMARY KEY,
            resources        TEXT NOT NULL DEFAULT '[]',
            selected_sources TEXT NOT NULL DEFAULT '[]',
            discovered_at    TEXT NOT NULL
        );",
    )
}
