use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Append-only event kinds (§6 "Shared stores"). The three-phase tick (sync,
/// signal, deliverable) each write one of these per unit of work, plus the
/// scheduler's own heartbeat and memory's write-through notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PlatformSynced,
    SignalProcessed,
    DeliverableRun,
    SchedulerHeartbeat,
    MemoryWritten,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PlatformSynced => "platform_synced",
            EventType::SignalProcessed => "signal_processed",
            EventType::DeliverableRun => "deliverable_run",
            EventType::SchedulerHeartbeat => "scheduler_heartbeat",
            EventType::MemoryWritten => "memory_written",
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "platform_synced" => Ok(EventType::PlatformSynced),
            "signal_processed" => Ok(EventType::SignalProcessed),
            "deliverable_run" => Ok(EventType::DeliverableRun),
            "scheduler_heartbeat" => Ok(EventType::SchedulerHeartbeat),
            "memory_written" => Ok(EventType::MemoryWritten),
            other => Err(format!("unknown event_type: {other}")),
        }
    }
}

/// One append-only row (§3 ActivityLog). `user_id` is `None` for
/// system-wide events (e.g. a scheduler heartbeat not scoped to one user).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: i64,
    pub user_id: Option<String>,
    pub event_type: EventType,
    pub summary: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A new event prior to insertion (no `id` yet).
#[derive(Debug, Clone)]
pub struct NewActivityEvent {
    pub user_id: Option<String>,
    pub event_type: EventType,
    pub summary: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl NewActivityEvent {
    pub fn new(user_id: impl Into<String>, event_type: EventType, summary: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            event_type,
            summary: summary.into(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn system(event_type: EventType, summary: impl Into<String>) -> Self {
        Self { user_id: None, event_type, summary: summary.into(), metadata: serde_json::Map::new() }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }
}
