use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use yarnnn_core::types::Platform;

/// One row of the unified content layer (§3).
///
/// `retained` and `expires_at` are orthogonal lifetime controls: a row is
/// live iff `retained || expires_at > now()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformContentItem {
    pub user_id: String,
    pub platform: Platform,
    pub resource_id: String,
    pub external_id: String,
    pub content: String,
    pub content_type: ContentType,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub source_timestamp: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    pub retained: bool,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Message,
    Email,
    Page,
    Event,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Message => "message",
            ContentType::Email => "email",
            ContentType::Page => "page",
            ContentType::Event => "event",
        }
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(ContentType::Message),
            "email" => Ok(ContentType::Email),
            "page" => Ok(ContentType::Page),
            "event" => Ok(ContentType::Event),
            other => Err(format!("unknown content_type: {other}")),
        }
    }
}

/// A single identified content row, returned by `query` / used by `retain`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentId(pub i64);

/// Filter set for `ContentCache::query` (§4.1).
#[derive(Debug, Clone, Default)]
pub struct ContentFilters {
    pub platform: Option<Platform>,
    pub resource_ids: Option<Vec<String>>,
    pub content_types: Option<Vec<ContentType>>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueriedContent {
    pub id: ContentId,
    pub item: PlatformContentItem,
}

/// A resource a provider exposes (§3 Landscape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub resource_type: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Per-connection catalog of resources plus the user's selection (§3).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Landscape {
    pub resources: Vec<Resource>,
    pub selected_sources: Vec<String>,
}

impl Landscape {
    /// Prune `selected_sources` to those still present in `resources`
    /// (§4.2 "landscape pruning"). Pure function — callers decide how to
    /// merge with a freshly re-read selection before writing.
    pub fn pruned(resources: Vec<Resource>, prior_selected: &[String]) -> Self {
        let known: std::collections::HashSet<&str> =
            resources.iter().map(|r| r.id.as_str()).collect();
        let selected_sources = prior_selected
            .iter()
            .filter(|id| known.contains(id.as_str()))
            .cloned()
            .collect();
        Self { resources, selected_sources }
    }
}

/// Per-resource freshness record (§3 SyncRegistry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRegistryEntry {
    pub user_id: String,
    pub platform: Platform,
    pub resource_id: String,
    pub last_synced_at: DateTime<Utc>,
    pub item_count: i64,
    pub source_latest_at: Option<DateTime<Utc>>,
    pub cursor: Option<String>,
}
