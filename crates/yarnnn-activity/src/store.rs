use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use crate::db::init_db;
use crate::error::Result;
use crate::types::{ActivityEvent, EventType, NewActivityEvent};

/// Append-only activity log (§3 ActivityLog, §6 "Shared stores"). A single
/// `Mutex<Connection>` guards writes, matching the teacher's
/// `skynet-memory::manager::MemoryManager` pattern applied to its
/// `conversations` table — this is the same "append rows, query by
/// (user, kind, time)" shape generalized from chat turns to system events.
pub struct ActivityStore {
    db: Mutex<rusqlite::Connection>,
}

impl ActivityStore {
    pub fn new(conn: rusqlite::Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    pub fn record(&self, event: NewActivityEvent) -> Result<()> {
        let db = self.db.lock().expect("activity log mutex poisoned");
        let metadata = serde_json::Value::Object(event.metadata).to_string();
        db.execute(
            "INSERT INTO activity_log (user_id, event_type, summary, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![event.user_id, event.event_type.as_str(), event.summary, metadata, Utc::now()],
        )?;
        debug!(event_type = event.event_type.as_str(), "activity event recorded");
        Ok(())
    }

    /// Most recent event of `event_type` for `user_id` (`None` for a
    /// system-scoped event type like `scheduler_heartbeat`).
    pub fn last_event(&self, user_id: Option<&str>, event_type: EventType) -> Result<Option<ActivityEvent>> {
        let db = self.db.lock().expect("activity log mutex poisoned");
        let row = db
            .query_row(
                "SELECT id, user_id, event_type, summary, metadata, created_at
                 FROM activity_log
                 WHERE event_type = ?1 AND ((user_id IS NULL AND ?2 IS NULL) OR user_id = ?2)
                 ORDER BY created_at DESC
                 LIMIT 1",
                params![event_type.as_str(), user_id],
                row_to_event,
            )
            .optional()?;
        Ok(row)
    }

    /// Last `limit` events for `user_id`, newest first — used by working
    /// memory's "recent activity" section (§4.5).
    pub fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<ActivityEvent>> {
        let db = self.db.lock().expect("activity log mutex poisoned");
        let mut stmt = db.prepare(
            "SELECT id, user_id, event_type, summary, metadata, created_at
             FROM activity_log
             WHERE user_id = ?1
             ORDER BY created_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![user_id, limit as i64], row_to_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Count of `deliverable_run` events tagged `status=failed` in the
    /// trailing 24 hours — feeds `SystemStateSummary.failed_jobs_24h`
    /// (§4.5, grounded on `original_source/.../system_state.py`'s
    /// `_get_failed_jobs`).
    pub fn failed_jobs_24h(&self, user_id: &str) -> Result<i64> {
        let cutoff = Utc::now() - Duration::hours(24);
        let db = self.db.lock().expect("activity log mutex poisoned");
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM activity_log
             WHERE user_id = ?1 AND event_type = ?2 AND created_at >= ?3
               AND json_extract(metadata, '$.status') = 'failed'",
            params![user_id, EventType::DeliverableRun.as_str(), cutoff],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<ActivityEvent> {
    let event_type: String = row.get(2)?;
    let metadata_raw: String = row.get(4)?;
    let metadata = serde_json::from_str::<serde_json::Value>(&metadata_raw)
        .ok()
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();
    let created_at: DateTime<Utc> = row.get(5)?;
    Ok(ActivityEvent {
        id: row.get(0)?,
        user_id: row.get(1)?,
        event_type: event_type.parse().unwrap_or(EventType::MemoryWritten),
        summary: row.get(3)?,
        metadata,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ActivityStore {
        ActivityStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn recent_returns_newest_first_for_user() {
        let store = store();
        store.record(NewActivityEvent::new("u1", EventType::PlatformSynced, "synced slack")).unwrap();
        store.record(NewActivityEvent::new("u1", EventType::SignalProcessed, "no action")).unwrap();
        let recent = store.recent("u1", 10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].event_type, EventType::SignalProcessed);
    }

    #[test]
    fn last_event_filters_by_type_and_user() {
        let store = store();
        store.record(NewActivityEvent::new("u1", EventType::PlatformSynced, "a")).unwrap();
        store.record(NewActivityEvent::new("u2", EventType::PlatformSynced, "b")).unwrap();
        let last = store.last_event(Some("u1"), EventType::PlatformSynced).unwrap().unwrap();
        assert_eq!(last.summary, "a");
    }

    #[test]
    fn last_event_for_system_scoped_type_ignores_user() {
        let store = store();
        store.record(NewActivityEvent::system(EventType::SchedulerHeartbeat, "tick")).unwrap();
        let last = store.last_event(None, EventType::SchedulerHeartbeat).unwrap();
        assert!(last.is_some());
    }

    #[test]
    fn failed_jobs_24h_counts_only_failed_status_within_window() {
        let store = store();
        let mut failed_meta = serde_json::Map::new();
        failed_meta.insert("status".to_string(), serde_json::Value::String("failed".to_string()));
        store
            .record(NewActivityEvent::new("u1", EventType::DeliverableRun, "run 1").with_metadata(failed_meta))
            .unwrap();
        let mut ok_meta = serde_json::Map::new();
        ok_meta.insert("status".to_string(), serde_json::Value::String("delivered".to_string()));
        store
            .record(NewActivityEvent::new("u1", EventType::DeliverableRun, "run 2").with_metadata(ok_meta))
            .unwrap();

        assert_eq!(store.failed_jobs_24h("u1").unwrap(), 1);
    }
}
