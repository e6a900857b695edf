use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use yarnnn_core::types::{
    DeliverableId, DeliverableSource, DeliverableVersionId, DestinationSpec, Platform, Schedule,
    TypeClassification, UserId, WorkTicketId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverableStatus {
    Active,
    Paused,
    Suggested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Schedule,
    Manual,
}

/// Provenance of a deliverable (§3). `SignalEmergent` is immutable once set
/// (invariant (b)) — enforced by never exposing a setter for it, not by a
/// runtime guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    UserCreated,
    SignalEmergent,
    Suggested,
}

/// Recurring or one-shot artifact spec owned by a user (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deliverable {
    pub id: DeliverableId,
    pub user_id: UserId,
    pub title: String,
    pub description: String,
    pub deliverable_type: String,
    pub type_classification: TypeClassification,
    pub schedule: Schedule,
    pub sources: Vec<DeliverableSource>,
    pub destination: DestinationSpec,
    pub trigger_type: TriggerType,
    pub origin: Origin,
    pub status: DeliverableStatus,
    pub next_run_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Generating,
    Delivered,
    Failed,
    Suggested,
    Draft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Delivering,
    Delivered,
    Partial,
    Failed,
}

/// At-generation freshness record for one source (§4.4 Step 1/5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub platform: Platform,
    pub resource_id: String,
    pub synced_at: Option<DateTime<Utc>>,
    pub stale: bool,
}

/// One outcome of a multi-destination delivery fan-out (§4.4 Step 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationOutcome {
    pub platform: String,
    pub target: String,
    pub status: String,
    pub external_id: Option<String>,
    pub external_url: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverableVersion {
    pub id: DeliverableVersionId,
    pub deliverable_id: DeliverableId,
    pub version_number: i64,
    pub status: VersionStatus,
    pub draft_content: Option<String>,
    pub final_content: Option<String>,
    pub delivery_status: DeliveryStatus,
    pub delivery_outcomes: Vec<DestinationOutcome>,
    pub source_snapshots: Vec<SourceSnapshot>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One per generation (§3). ADR-042: no ticket chaining — `depends_on` is
/// always null, so the field doesn't exist on this type at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkTicket {
    pub id: WorkTicketId,
    pub deliverable_id: DeliverableId,
    pub deliverable_version_id: DeliverableVersionId,
    pub status: TicketStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Carried from C3 into C4 when a generation run was signal-triggered
/// (§4.3 Step 4 "this is how the generation agent learns why it was
/// invoked"). Absent for ordinary scheduled runs.
#[derive(Debug, Clone, Default)]
pub struct TriggerContext {
    pub reasoning: String,
    pub signal_context: serde_json::Map<String, serde_json::Value>,
}

/// Output of strategy-based context gathering (§4.4 Step 2).
#[derive(Debug, Clone, Default)]
pub struct GatheredContext {
    pub content: String,
    pub sources_used: Vec<Platform>,
    pub items_fetched: usize,
    pub platform_content_ids: Vec<yarnnn_content_cache::ContentId>,
    pub source_snapshots: Vec<SourceSnapshot>,
}
