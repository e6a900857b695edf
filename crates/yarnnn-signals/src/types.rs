use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use yarnnn_core::types::{DeliverableId, DeliverableSource, Platform, UserId};

/// Minimum confidence to act on a signal (§4.3 Step 3).
pub const CONFIDENCE_THRESHOLD: f64 = 0.60;

/// A bounded textual digest of one platform's recent content, the unit
/// `extract_signal_summary` produces per connected platform (§4.3 Step 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformDigest {
    pub items_count: usize,
    pub time_range_start: DateTime<Utc>,
    pub time_range_end: DateTime<Utc>,
    pub content_summary: String,
}

/// Cross-platform signal summary for one user (§4.3 Step 1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalSummary {
    pub calendar_content: Option<PlatformDigest>,
    pub gmail_content: Option<PlatformDigest>,
    pub slack_content: Option<PlatformDigest>,
    pub notion_content: Option<PlatformDigest>,
}

impl SignalSummary {
    pub fn has_signals(&self) -> bool {
        self.calendar_content.is_some()
            || self.gmail_content.is_some()
            || self.slack_content.is_some()
            || self.notion_content.is_some()
    }

    pub fn total_items(&self) -> usize {
        [&self.calendar_content, &self.gmail_content, &self.slack_content, &self.notion_content]
            .iter()
            .filter_map(|d| d.as_ref())
            .map(|d| d.items_count)
            .sum()
    }
}

/// One decision from the reasoning pass (§4.3 Step 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action_type", rename_all = "snake_case")]
pub enum SignalAction {
    CreateSignalEmergent {
        deliverable_type: String,
        title: String,
        description: String,
        confidence: f64,
        #[serde(default)]
        sources: Vec<DeliverableSource>,
        #[serde(default)]
        signal_context: serde_json::Map<String, serde_json::Value>,
    },
    TriggerExisting {
        deliverable_type: String,
        trigger_deliverable_id: DeliverableId,
        confidence: f64,
    },
    NoAction,
}

impl SignalAction {
    pub fn confidence(&self) -> f64 {
        match self {
            SignalAction::CreateSignalEmergent { confidence, .. } => *confidence,
            SignalAction::TriggerExisting { confidence, .. } => *confidence,
            SignalAction::NoAction => 1.0,
        }
    }

    pub fn deliverable_type(&self) -> Option<&str> {
        match self {
            SignalAction::CreateSignalEmergent { deliverable_type, .. } => Some(deliverable_type),
            SignalAction::TriggerExisting { deliverable_type, .. } => Some(deliverable_type),
            SignalAction::NoAction => None,
        }
    }

    /// `signal_ref` is the dedup key within `signal_context` — a calendar
    /// `event_id` or a gmail `thread_id` (§4.3 Step 3).
    pub fn signal_ref(&self) -> Option<String> {
        match self {
            SignalAction::CreateSignalEmergent { signal_context, .. } => signal_context
                .get("event_id")
                .or_else(|| signal_context.get("thread_id"))
                .and_then(|v| v.as_str())
                .map(str::to_string),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalProcessingResult {
    pub user_id: UserId,
    pub processed_at: DateTime<Utc>,
    pub actions: Vec<SignalAction>,
    /// Logged, never persisted (§4.3 Step 2's "free-form reasoning string used only for logging").
    pub reasoning_summary: String,
}

impl SignalProcessingResult {
    pub fn empty(user_id: UserId, processed_at: DateTime<Utc>) -> Self {
        Self { user_id, processed_at, actions: Vec::new(), reasoning_summary: String::new() }
    }
}

/// A capped view of an existing deliverable, for the reasoning prompt and
/// the dedup filter (§4.3 Step 2 "existing deliverables ≤10").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExistingDeliverableRef {
    pub id: DeliverableId,
    pub deliverable_type: String,
    pub title: String,
    pub next_run_at: Option<DateTime<Utc>>,
    pub recent_content_preview: Option<String>,
}

/// A capped user-context row for the reasoning prompt (§4.3 Step 2 "≤15 entries").
#[derive(Debug, Clone)]
pub struct ContextLine {
    pub key: String,
    pub value: String,
}

/// A capped recent activity summary line (§4.3 Step 2 "≤8 events").
#[derive(Debug, Clone)]
pub struct ActivityLine {
    pub summary: String,
}

/// Grouping used by `extract_signal_summary` to know which cache filters
/// and lookback window apply to each platform (§4.3 Step 1).
#[derive(Debug, Clone, Copy)]
pub struct PlatformWindow {
    pub platform: Platform,
    pub lookback_days: i64,
    /// `true` looks forward from now (calendar); `false` looks backward (mail/chat/docs).
    pub forward: bool,
}

pub const PLATFORM_WINDOWS: [PlatformWindow; 4] = [
    PlatformWindow { platform: Platform::Calendar, lookback_days: 7, forward: true },
    PlatformWindow { platform: Platform::Gmail, lookback_days: 7, forward: false },
    PlatformWindow { platform: Platform::Slack, lookback_days: 7, forward: false },
    PlatformWindow { platform: Platform::Notion, lookback_days: 14, forward: false },
];
