use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};

use crate::error::Result;

/// Dedupe record (§3 SignalHistory): `(user_id, deliverable_type, signal_ref)`
/// unique within a configured window, preventing re-triggering off the same
/// signal (e.g. the same calendar event).
pub struct SignalHistory {
    db: Mutex<rusqlite::Connection>,
}

impl SignalHistory {
    pub fn new(conn: rusqlite::Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS signal_history (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id          TEXT NOT NULL,
                deliverable_type TEXT NOT NULL,
                signal_ref       TEXT NOT NULL,
                deliverable_id   TEXT NOT NULL,
                triggered_at     TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_signal_history_lookup
                ON signal_history(user_id, deliverable_type, signal_ref, triggered_at DESC);",
        )?;
        Ok(Self { db: Mutex::new(conn) })
    }

    /// `true` iff no trigger for this `(user_id, deliverable_type, signal_ref)`
    /// exists within `dedup_window`.
    pub fn is_eligible(&self, user_id: &str, deliverable_type: &str, signal_ref: &str, dedup_window: Duration, now: DateTime<Utc>) -> Result<bool> {
        let cutoff = now - dedup_window;
        let db = self.db.lock().expect("signal history mutex poisoned");
        let hit: Option<i64> = db
            .query_row(
                "SELECT 1 FROM signal_history
                 WHERE user_id = ?1 AND deliverable_type = ?2 AND signal_ref = ?3 AND triggered_at >= ?4
                 LIMIT 1",
                params![user_id, deliverable_type, signal_ref, cutoff],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hit.is_none())
    }

    pub fn record_trigger(&self, user_id: &str, deliverable_type: &str, signal_ref: &str, deliverable_id: &str) -> Result<()> {
        let db = self.db.lock().expect("signal history mutex poisoned");
        db.execute(
            "INSERT INTO signal_history (user_id, deliverable_type, signal_ref, deliverable_id, triggered_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, deliverable_type, signal_ref, deliverable_id, Utc::now()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> SignalHistory {
        SignalHistory::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn fresh_signal_ref_is_eligible() {
        let history = history();
        assert!(history.is_eligible("u1", "research_brief", "evt-1", Duration::hours(72), Utc::now()).unwrap());
    }

    #[test]
    fn recently_triggered_signal_ref_is_not_eligible() {
        let history = history();
        history.record_trigger("u1", "research_brief", "evt-1", "d1").unwrap();
        assert!(!history.is_eligible("u1", "research_brief", "evt-1", Duration::hours(72), Utc::now()).unwrap());
    }

    #[test]
    fn signal_ref_outside_window_is_eligible_again() {
        let history = history();
        history.record_trigger("u1", "research_brief", "evt-1", "d1").unwrap();
        let far_future = Utc::now() + Duration::hours(200);
        assert!(history.is_eligible("u1", "research_brief", "evt-1", Duration::hours(72), far_future).unwrap());
    }
}
