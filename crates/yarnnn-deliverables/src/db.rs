use rusqlite::{Connection, Result};

/// Idempotent schema setup, following `yarnnn_content_cache::db::init_db`.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_deliverables_table(conn)?;
    create_versions_table(conn)?;
    create_tickets_table(conn)?;
    Ok(())
}

fn create_deliverables_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS deliverables (
            id                   TEXT PRIMARY KEY,
            user_id              TEXT NOT NULL,
            title                TEXT NOT NULL,
            description          TEXT NOT NULL,
            deliverable_type     TEXT NOT NULL,
            type_classification  TEXT NOT NULL,
            schedule             TEXT NOT NULL,
            sources              TEXT NOT NULL DEFAULT '[]',
            destination          TEXT NOT NULL,
            trigger_type         TEXT NOT NULL,
            origin               TEXT NOT NULL,
            status               TEXT NOT NULL,
            next_run_at          TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_deliverables_due
            ON deliverables(status, next_run_at);
        CREATE INDEX IF NOT EXISTS idx_deliverables_user
            ON deliverables(user_id, deliverable_type);",
    )
}

fn create_versions_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS deliverable_versions (
            id                 TEXT PRIMARY KEY,
            deliverable_id     TEXT NOT NULL,
            version_number     INTEGER NOT NULL,
            status             TEXT NOT NULL,
            draft_content      TEXT,
            final_content      TEXT,
            delivery_status    TEXT NOT NULL,
            delivery_outcomes  TEXT NOT NULL DEFAULT '[]',
            source_snapshots   TEXT NOT NULL DEFAULT '[]',
            delivered_at       TEXT,
            created_at         TEXT NOT NULL,
            UNIQUE(deliverable_id, version_number)
        );
        CREATE INDEX IF NOT EXISTS idx_versions_deliverable
            ON deliverable_versions(deliverable_id, version_number DESC);",
    )
}

fn create_tickets_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS work_tickets (
            id                      TEXT PRIMARY KEY,
            deliverable_id          TEXT NOT NULL,
            deliverable_version_id  TEXT NOT NULL,
            status                  TEXT NOT NULL,
            started_at              TEXT NOT NULL,
            completed_at            TEXT,
            error_message           TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_tickets_status
            ON work_tickets(status, started_at);",
    )
}
