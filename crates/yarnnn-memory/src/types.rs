use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use yarnnn_core::types::Platform;

/// Namespace convention for `UserContext.key` (§3):
/// `name|role|company|timezone|summary|tone_<platform>|verbosity_<platform>|
/// fact:<slug>|instruction:<slug>|preference:<slug>|pattern:<slug>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextKey {
    Name,
    Role,
    Company,
    Timezone,
    Summary,
    Tone(Platform),
    Verbosity(Platform),
    Fact(String),
    Instruction(String),
    Preference(String),
    Pattern(String),
}

impl std::fmt::Display for ContextKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name => write!(f, "name"),
            Self::Role => write!(f, "role"),
            Self::Company => write!(f, "company"),
            Self::Timezone => write!(f, "timezone"),
            Self::Summary => write!(f, "summary"),
            Self::Tone(p) => write!(f, "tone_{}", p.as_str()),
            Self::Verbosity(p) => write!(f, "verbosity_{}", p.as_str()),
            Self::Fact(slug) => write!(f, "fact:{slug}"),
            Self::Instruction(slug) => write!(f, "instruction:{slug}"),
            Self::Preference(slug) => write!(f, "preference:{slug}"),
            Self::Pattern(slug) => write!(f, "pattern:{slug}"),
        }
    }
}

impl std::str::FromStr for ContextKey {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(slug) = s.strip_prefix("fact:") {
            return Ok(Self::Fact(slug.to_string()));
        }
        if let Some(slug) = s.strip_prefix("instruction:") {
            return Ok(Self::Instruction(slug.to_string()));
        }
        if let Some(slug) = s.strip_prefix("preference:") {
            return Ok(Self::Preference(slug.to_string()));
        }
        if let Some(slug) = s.strip_prefix("pattern:") {
            return Ok(Self::Pattern(slug.to_string()));
        }
        if let Some(platform) = s.strip_prefix("tone_") {
            return platform
                .parse::<Platform>()
                .map(Self::Tone)
                .map_err(|_| format!("unknown platform in tone key: {platform}"));
        }
        if let Some(platform) = s.strip_prefix("verbosity_") {
            return platform
                .parse::<Platform>()
                .map(Self::Verbosity)
                .map_err(|_| format!("unknown platform in verbosity key: {platform}"));
        }
        match s {
            "name" => Ok(Self::Name),
            "role" => Ok(Self::Role),
            "company" => Ok(Self::Company),
            "timezone" => Ok(Self::Timezone),
            "summary" => Ok(Self::Summary),
            other => Err(format!("unknown context key: {other}")),
        }
    }
}

impl ContextKey {
    /// True for the fixed profile slots (as opposed to open-ended
    /// fact/instruction/preference/pattern slugs) — used to group the
    /// rendered working-memory block (§4.5).
    pub fn is_profile_field(&self) -> bool {
        matches!(
            self,
            Self::Name | Self::Role | Self::Company | Self::Timezone | Self::Summary
        )
    }
}

/// Provenance of a `UserContext` write. Ordering is the write-priority
/// used by upsert (§3): `UserStated > Conversation > Feedback > Pattern`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    /// Lowest priority: a pattern the system noticed on its own.
    Pattern,
    /// The user's reaction to a delivered artifact (edit, reject, approve).
    Feedback,
    /// Something surfaced from a platform conversation.
    Conversation,
    /// The user told us directly. Highest priority, never silently overwritten.
    UserStated,
}

/// Single row of the `UserContext` entity (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContextEntry {
    pub user_id: String,
    pub key: ContextKey,
    pub value: String,
    pub source: ContextSource,
    pub confidence: f64,
    pub updated_at: DateTime<Utc>,
}

/// Per-platform sync freshness, as surfaced in the working-memory block
/// (§4.5) — supplied by the caller (yarnnn-content-cache), not read here,
/// to avoid a cross-crate storage dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncFreshness {
    pub platform: Platform,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub item_count: i64,
}

/// One line of the "recently updated active deliverables" section (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverableSummary {
    pub deliverable_id: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

/// System-state line of the working-memory block (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStateSummary {
    pub last_signal_pass_at: Option<DateTime<Utc>>,
    pub pending_reviews_count: i64,
    pub failed_jobs_24h: i64,
}

/// Everything `render_working_memory` needs, gathered by the caller from
/// the content-cache, deliverables, activity, and memory stores.
#[derive(Debug, Clone)]
pub struct WorkingMemoryInputs {
    pub entries: Vec<UserContextEntry>,
    pub recent_deliverables: Vec<DeliverableSummary>,
    pub sync_freshness: Vec<SyncFreshness>,
    pub system_state: SystemStateSummary,
}
