use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use yarnnn_core::types::{
    DeliverableId, DeliverableVersionId, UserId, WorkTicketId,
};

use crate::db::init_db;
use crate::error::{DeliverableError, Result};
use crate::types::{
    Deliverable, DeliverableStatus, DeliverableVersion, DeliveryStatus, Origin, TicketStatus,
    TriggerType, VersionStatus, WorkTicket,
};

/// Persistence for deliverables, their generated versions, and work tickets
/// (§3). A single `Mutex<Connection>` guards all writes, matching
/// `yarnnn_content_cache::ContentCache`.
pub struct DeliverableStore {
    db: Mutex<rusqlite::Connection>,
}

impl DeliverableStore {
    pub fn new(conn: rusqlite::Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    pub fn insert_deliverable(&self, deliverable: &Deliverable) -> Result<()> {
        let db = self.db.lock().expect("deliverable store mutex poisoned");
        db.execute(
            "INSERT INTO deliverables
                (id, user_id, title, description, deliverable_type, type_classification,
                 schedule, sources, destination, trigger_type, origin, status, next_run_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                deliverable.id.as_str(),
                deliverable.user_id.as_str(),
                deliverable.title,
                deliverable.description,
                deliverable.deliverable_type,
                serde_json::to_string(&deliverable.type_classification)?,
                serde_json::to_string(&deliverable.schedule)?,
                serde_json::to_string(&deliverable.sources)?,
                serde_json::to_string(&deliverable.destination)?,
                status_str(deliverable.trigger_type),
                origin_str(deliverable.origin),
                deliverable_status_str(deliverable.status),
                deliverable.next_run_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn get_deliverable(&self, id: &DeliverableId) -> Result<Deliverable> {
        let db = self.db.lock().expect("deliverable store mutex poisoned");
        db.query_row(
            "SELECT id, user_id, title, description, deliverable_type, type_classification,
                    schedule, sources, destination, trigger_type, origin, status, next_run_at
             FROM deliverables WHERE id = ?1",
            params![id.as_str()],
            row_to_deliverable,
        )
        .optional()?
        .ok_or_else(|| DeliverableError::NotFound(id.as_str()))
    }

    /// Active deliverables whose `next_run_at` has passed (§4.4 Step 1 entry
    /// condition, fed by the scheduler's `DeliverableWorkItem`).
    pub fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Deliverable>> {
        let db = self.db.lock().expect("deliverable store mutex poisoned");
        let mut stmt = db.prepare(
            "SELECT id, user_id, title, description, deliverable_type, type_classification,
                    schedule, sources, destination, trigger_type, origin, status, next_run_at
             FROM deliverables
             WHERE status = 'active' AND next_run_at IS NOT NULL AND next_run_at <= ?1
             ORDER BY next_run_at ASC",
        )?;
        let rows = stmt.query_map(params![now.to_rfc3339()], row_to_deliverable)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Active deliverables for `user_id`, newest-created first — the pool a
    /// signal pass considers for `trigger_existing` (§4.3 Step 2).
    pub fn list_active_for_user(&self, user_id: &str) -> Result<Vec<Deliverable>> {
        let db = self.db.lock().expect("deliverable store mutex poisoned");
        let mut stmt = db.prepare(
            "SELECT id, user_id, title, description, deliverable_type, type_classification,
                    schedule, sources, destination, trigger_type, origin, status, next_run_at
             FROM deliverables
             WHERE user_id = ?1 AND status = 'active'
             ORDER BY rowid DESC",
        )?;
        let rows = stmt.query_map(params![user_id], row_to_deliverable)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn update_next_run_at(
        &self,
        id: &DeliverableId,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let db = self.db.lock().expect("deliverable store mutex poisoned");
        db.execute(
            "UPDATE deliverables SET next_run_at = ?1 WHERE id = ?2",
            params![next_run_at.map(|t| t.to_rfc3339()), id.as_str()],
        )?;
        Ok(())
    }

    pub fn next_version_number(&self, deliverable_id: &DeliverableId) -> Result<i64> {
        let db = self.db.lock().expect("deliverable store mutex poisoned");
        let max: Option<i64> = db
            .query_row(
                "SELECT MAX(version_number) FROM deliverable_versions WHERE deliverable_id = ?1",
                params![deliverable_id.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(max.unwrap_or(0) + 1)
    }

    pub fn insert_version(&self, version: &DeliverableVersion) -> Result<()> {
        let db = self.db.lock().expect("deliverable store mutex poisoned");
        db.execute(
            "INSERT INTO deliverable_versions
                (id, deliverable_id, version_number, status, draft_content, final_content,
                 delivery_status, delivery_outcomes, source_snapshots, delivered_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                version.id.as_str(),
                version.deliverable_id.as_str(),
                version.version_number,
                version_status_str(version.status),
                version.draft_content,
                version.final_content,
                delivery_status_str(version.delivery_status),
                serde_json::to_string(&version.delivery_outcomes)?,
                serde_json::to_string(&version.source_snapshots)?,
                version.delivered_at.map(|t| t.to_rfc3339()),
                version.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_version(&self, id: &DeliverableVersionId) -> Result<DeliverableVersion> {
        let db = self.db.lock().expect("deliverable store mutex poisoned");
        db.query_row(
            "SELECT id, deliverable_id, version_number, status, draft_content, final_content,
                    delivery_status, delivery_outcomes, source_snapshots, delivered_at, created_at
             FROM deliverable_versions WHERE id = ?1",
            params![id.as_str()],
            row_to_version,
        )
        .optional()?
        .ok_or_else(|| DeliverableError::NotFound(id.as_str()))
    }

    /// Applies a terminal or intermediate state transition plus content and
    /// delivery bookkeeping in one statement (§4.4 state machine).
    #[allow(clippy::too_many_arguments)]
    pub fn update_version(
        &self,
        id: &DeliverableVersionId,
        status: VersionStatus,
        draft_content: Option<&str>,
        final_content: Option<&str>,
        delivery_status: DeliveryStatus,
        delivery_outcomes: &[crate::types::DestinationOutcome],
        delivered_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let db = self.db.lock().expect("deliverable store mutex poisoned");
        db.execute(
            "UPDATE deliverable_versions
             SET status = ?1, draft_content = ?2, final_content = ?3, delivery_status = ?4,
                 delivery_outcomes = ?5, delivered_at = ?6
             WHERE id = ?7",
            params![
                version_status_str(status),
                draft_content,
                final_content,
                delivery_status_str(delivery_status),
                serde_json::to_string(delivery_outcomes)?,
                delivered_at.map(|t| t.to_rfc3339()),
                id.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn insert_ticket(&self, ticket: &WorkTicket) -> Result<()> {
        let db = self.db.lock().expect("deliverable store mutex poisoned");
        db.execute(
            "INSERT INTO work_tickets
                (id, deliverable_id, deliverable_version_id, status, started_at,
                 completed_at, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                ticket.id.as_str(),
                ticket.deliverable_id.as_str(),
                ticket.deliverable_version_id.as_str(),
                ticket_status_str(ticket.status),
                ticket.started_at.to_rfc3339(),
                ticket.completed_at.map(|t| t.to_rfc3339()),
                ticket.error_message,
            ],
        )?;
        Ok(())
    }

    /// Most recent versions for a deliverable, newest first — feeds the
    /// "past versions" feedback-continuity slice (§4.4 Step 2).
    pub fn list_recent_versions(
        &self,
        deliverable_id: &DeliverableId,
        limit: usize,
    ) -> Result<Vec<DeliverableVersion>> {
        let db = self.db.lock().expect("deliverable store mutex poisoned");
        let mut stmt = db.prepare(
            "SELECT id, deliverable_id, version_number, status, draft_content, final_content,
                    delivery_status, delivery_outcomes, source_snapshots, delivered_at, created_at
             FROM deliverable_versions
             WHERE deliverable_id = ?1
             ORDER BY version_number DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![deliverable_id.as_str(), limit as i64], row_to_version)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        out.reverse();
        Ok(out)
    }

    /// Up to `limit` active deliverables for `user_id` with a version,
    /// ordered by most-recently-generated — the working-memory block's
    /// "recently updated active deliverables" section (§4.5).
    pub fn recent_deliverable_summaries(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<yarnnn_memory::DeliverableSummary>> {
        let db = self.db.lock().expect("deliverable store mutex poisoned");
        let mut stmt = db.prepare(
            "SELECT d.id, d.title, MAX(v.created_at) AS updated_at
             FROM deliverables d
             JOIN deliverable_versions v ON v.deliverable_id = d.id
             WHERE d.user_id = ?1 AND d.status = 'active'
             GROUP BY d.id
             ORDER BY updated_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit as i64], |row| {
            let updated_at: String = row.get(2)?;
            Ok(yarnnn_memory::DeliverableSummary {
                deliverable_id: row.get(0)?,
                title: row.get(1)?,
                updated_at: DateTime::parse_from_rfc3339(&updated_at).unwrap().with_timezone(&Utc),
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Count of `draft`/`suggested` versions belonging to `user_id`'s
    /// deliverables — the "pending reviews" figure in the working-memory
    /// system-state summary (§4.5) and the `GetSystemState` tool.
    pub fn count_pending_review(&self, user_id: &str) -> Result<i64> {
        let db = self.db.lock().expect("deliverable store mutex poisoned");
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM deliverable_versions v
             JOIN deliverables d ON d.id = v.deliverable_id
             WHERE d.user_id = ?1 AND v.status IN ('draft', 'suggested')",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn update_ticket_status(
        &self,
        id: &WorkTicketId,
        status: TicketStatus,
        completed_at: Option<DateTime<Utc>>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let db = self.db.lock().expect("deliverable store mutex poisoned");
        db.execute(
            "UPDATE work_tickets SET status = ?1, completed_at = ?2, error_message = ?3
             WHERE id = ?4",
            params![
                ticket_status_str(status),
                completed_at.map(|t| t.to_rfc3339()),
                error_message,
                id.as_str(),
            ],
        )?;
        debug!(ticket_id = %id, status = ?status, "work ticket updated");
        Ok(())
    }
}

fn status_str(t: TriggerType) -> &'static str {
    match t {
        TriggerType::Schedule => "schedule",
        TriggerType::Manual => "manual",
    }
}

fn origin_str(o: Origin) -> &'static str {
    match o {
        Origin::UserCreated => "user_created",
        Origin::SignalEmergent => "signal_emergent",
        Origin::Suggested => "suggested",
    }
}

fn deliverable_status_str(s: DeliverableStatus) -> &'static str {
    match s {
        DeliverableStatus::Active => "active",
        DeliverableStatus::Paused => "paused",
        DeliverableStatus::Suggested => "suggested",
    }
}

fn version_status_str(s: VersionStatus) -> &'static str {
    match s {
        VersionStatus::Generating => "generating",
        VersionStatus::Delivered => "delivered",
        VersionStatus::Failed => "failed",
        VersionStatus::Suggested => "suggested",
        VersionStatus::Draft => "draft",
    }
}

fn delivery_status_str(s: DeliveryStatus) -> &'static str {
    match s {
        DeliveryStatus::Pending => "pending",
        DeliveryStatus::Delivering => "delivering",
        DeliveryStatus::Delivered => "delivered",
        DeliveryStatus::Partial => "partial",
        DeliveryStatus::Failed => "failed",
    }
}

fn ticket_status_str(s: TicketStatus) -> &'static str {
    match s {
        TicketStatus::Pending => "pending",
        TicketStatus::Running => "running",
        TicketStatus::Completed => "completed",
        TicketStatus::Failed => "failed",
    }
}

fn row_to_deliverable(row: &rusqlite::Row<'_>) -> rusqlite::Result<Deliverable> {
    let id: String = row.get(0)?;
    let trigger_type: String = row.get(9)?;
    let origin: String = row.get(10)?;
    let status: String = row.get(11)?;
    let next_run_at: Option<String> = row.get(12)?;
    let type_classification: String = row.get(5)?;
    let schedule: String = row.get(6)?;
    let sources: String = row.get(7)?;
    let destination: String = row.get(8)?;

    Ok(Deliverable {
        id: DeliverableId::from_str(&id).unwrap_or_default(),
        user_id: UserId::from(row.get::<_, String>(1)?.as_str()),
        title: row.get(2)?,
        description: row.get(3)?,
        deliverable_type: row.get(4)?,
        type_classification: serde_json::from_str(&type_classification).unwrap(),
        schedule: serde_json::from_str(&schedule).unwrap(),
        sources: serde_json::from_str(&sources).unwrap_or_default(),
        destination: serde_json::from_str(&destination).unwrap(),
        trigger_type: match trigger_type.as_str() {
            "manual" => TriggerType::Manual,
            _ => TriggerType::Schedule,
        },
        origin: match origin.as_str() {
            "signal_emergent" => Origin::SignalEmergent,
            "suggested" => Origin::Suggested,
            _ => Origin::UserCreated,
        },
        status: match status.as_str() {
            "paused" => DeliverableStatus::Paused,
            "suggested" => DeliverableStatus::Suggested,
            _ => DeliverableStatus::Active,
        },
        next_run_at: next_run_at
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc)),
    })
}

fn row_to_version(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeliverableVersion> {
    let id: String = row.get(0)?;
    let deliverable_id: String = row.get(1)?;
    let status: String = row.get(3)?;
    let delivery_status: String = row.get(6)?;
    let delivery_outcomes: String = row.get(7)?;
    let source_snapshots: String = row.get(8)?;
    let delivered_at: Option<String> = row.get(9)?;
    let created_at: String = row.get(10)?;

    Ok(DeliverableVersion {
        id: DeliverableVersionId::from_str(&id).unwrap_or_default(),
        deliverable_id: DeliverableId::from_str(&deliverable_id).unwrap_or_default(),
        version_number: row.get(2)?,
        status: match status.as_str() {
            "delivered" => VersionStatus::Delivered,
            "failed" => VersionStatus::Failed,
            "suggested" => VersionStatus::Suggested,
            "draft" => VersionStatus::Draft,
            _ => VersionStatus::Generating,
        },
        draft_content: row.get(4)?,
        final_content: row.get(5)?,
        delivery_status: match delivery_status.as_str() {
            "delivering" => DeliveryStatus::Delivering,
            "delivered" => DeliveryStatus::Delivered,
            "partial" => DeliveryStatus::Partial,
            "failed" => DeliveryStatus::Failed,
            _ => DeliveryStatus::Pending,
        },
        delivery_outcomes: serde_json::from_str(&delivery_outcomes).unwrap_or_default(),
        source_snapshots: serde_json::from_str(&source_snapshots).unwrap_or_default(),
        delivered_at: delivered_at
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc)),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .unwrap()
            .with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use yarnnn_core::types::{DestinationSpec, Schedule, TypeClassification};

    fn test_store() -> DeliverableStore {
        DeliverableStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap()
    }

    fn sample_deliverable() -> Deliverable {
        Deliverable {
            id: DeliverableId::new(),
            user_id: UserId::from("u1"),
            title: "Weekly digest".into(),
            description: "desc".into(),
            deliverable_type: "digest".into(),
            type_classification: TypeClassification::cross_platform(24),
            schedule: Schedule::None,
            sources: vec![],
            destination: DestinationSpec::Single(yarnnn_core::types::Destination {
                platform: "resend".into(),
                target: "me@example.com".into(),
                format: "html".into(),
                options: Default::default(),
            }),
            trigger_type: TriggerType::Manual,
            origin: Origin::UserCreated,
            status: DeliverableStatus::Active,
            next_run_at: Some(Utc::now()),
        }
    }

    #[test]
    fn round_trips_a_deliverable() {
        let store = test_store();
        let deliverable = sample_deliverable();
        store.insert_deliverable(&deliverable).unwrap();

        let loaded = store.get_deliverable(&deliverable.id).unwrap();
        assert_eq!(loaded.title, "Weekly digest");
        assert_eq!(loaded.sources.len(), 0);
    }

    #[test]
    fn list_due_only_returns_active_past_next_run() {
        let store = test_store();
        let mut due = sample_deliverable();
        due.next_run_at = Some(Utc::now() - chrono::Duration::hours(1));
        store.insert_deliverable(&due).unwrap();

        let mut future = sample_deliverable();
        future.next_run_at = Some(Utc::now() + chrono::Duration::hours(1));
        store.insert_deliverable(&future).unwrap();

        let results = store.list_due(Utc::now()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, due.id);
    }

    #[test]
    fn version_numbers_increment_per_deliverable() {
        let store = test_store();
        let deliverable = sample_deliverable();
        store.insert_deliverable(&deliverable).unwrap();

        assert_eq!(store.next_version_number(&deliverable.id).unwrap(), 1);

        let version = DeliverableVersion {
            id: DeliverableVersionId::new(),
            deliverable_id: deliverable.id.clone(),
            version_number: 1,
            status: VersionStatus::Generating,
            draft_content: None,
            final_content: None,
            delivery_status: DeliveryStatus::Pending,
            delivery_outcomes: vec![],
            source_snapshots: vec![],
            delivered_at: None,
            created_at: Utc::now(),
        };
        store.insert_version(&version).unwrap();

        assert_eq!(store.next_version_number(&deliverable.id).unwrap(), 2);
    }
}
