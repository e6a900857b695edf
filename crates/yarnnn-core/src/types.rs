use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a user of the orchestrator (opaque — minted by the
/// external auth collaborator, never constructed here).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn as_str(&self) -> String {
                self.0.to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(DeliverableId);
uuid_id!(DeliverableVersionId);
uuid_id!(WorkTicketId);
uuid_id!(PlatformConnectionId);

/// The four platforms the orchestrator observes and/or delivers to.
///
/// Modeled as a closed enum (not a string) per the spec's strategy/exporter
/// registry redesign — every match site is exhaustive at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Slack,
    Gmail,
    Notion,
    Calendar,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Slack => "slack",
            Platform::Gmail => "gmail",
            Platform::Notion => "notion",
            Platform::Calendar => "calendar",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "slack" => Ok(Platform::Slack),
            "gmail" => Ok(Platform::Gmail),
            "notion" => Ok(Platform::Notion),
            "calendar" | "google_calendar" => Ok(Platform::Calendar),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// Subscription tier, driving sync cadence (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Starter,
    Pro,
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Tier::Free),
            "starter" => Ok(Tier::Starter),
            "pro" => Ok(Tier::Pro),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

/// Connection lifecycle state for a `PlatformConnection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Error,
}

/// How a deliverable gathers its context — the closed strategy set from §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Binding {
    PlatformBound,
    CrossPlatform,
    Research,
    Hybrid,
}

/// Classification block attached to a deliverable (§3).
///
/// `primary_platform` is required when `binding == PlatformBound` (invariant
/// (a) in §3) — enforced at construction time by `TypeClassification::new`,
/// not by a runtime check scattered through callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeClassification {
    pub binding: Binding,
    pub primary_platform: Option<Platform>,
    /// Hours a source may go unsynced before a deliverable considers it stale (§4.4 Step 1).
    pub freshness_requirement_hours: i64,
    /// Unknown/future fields round-trip untouched (§9 dynamic-typing redesign note).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TypeClassification {
    pub fn platform_bound(platform: Platform, freshness_requirement_hours: i64) -> Self {
        Self {
            binding: Binding::PlatformBound,
            primary_platform: Some(platform),
            freshness_requirement_hours,
            extra: serde_json::Map::new(),
        }
    }

    pub fn cross_platform(freshness_requirement_hours: i64) -> Self {
        Self {
            binding: Binding::CrossPlatform,
            primary_platform: None,
            freshness_requirement_hours,
            extra: serde_json::Map::new(),
        }
    }
}

/// Recurrence rule for a deliverable (§3) — a single tagged representation,
/// per the spec's redesign note collapsing `schedule_*`/`frequency_*`/`is_active`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "frequency", rename_all = "snake_case")]
pub enum Schedule {
    /// Signal-emergent deliverables are created with `schedule = None` (§4.3 Step 4).
    None,
    Daily { time: NaiveTimeOfDay, timezone: String },
    Weekly { day: Weekday, time: NaiveTimeOfDay, timezone: String },
    Monthly { day_of_month: u8, time: NaiveTimeOfDay, timezone: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NaiveTimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl Weekday {
    pub fn num_days_from_monday(&self) -> i64 {
        match self {
            Weekday::Mon => 0,
            Weekday::Tue => 1,
            Weekday::Wed => 2,
            Weekday::Thu => 3,
            Weekday::Fri => 4,
            Weekday::Sat => 5,
            Weekday::Sun => 6,
        }
    }

    pub fn from_chrono(d: chrono::Weekday) -> Self {
        match d {
            chrono::Weekday::Mon => Weekday::Mon,
            chrono::Weekday::Tue => Weekday::Tue,
            chrono::Weekday::Wed => Weekday::Wed,
            chrono::Weekday::Thu => Weekday::Thu,
            chrono::Weekday::Fri => Weekday::Fri,
            chrono::Weekday::Sat => Weekday::Sat,
            chrono::Weekday::Sun => Weekday::Sun,
        }
    }
}

/// One source a deliverable draws context from (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeliverableSource {
    IntegrationImport {
        provider: Platform,
        resource_id: String,
    },
    Document {
        document_id: String,
    },
    Description {
        text: String,
    },
}

/// Where a delivered version is sent (§3, §4.4 Step 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    pub platform: String,
    pub target: String,
    pub format: String,
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

/// A deliverable may fan out to several destinations (§4.4 Step 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DestinationSpec {
    Single(Destination),
    Multi(Vec<Destination>),
}

impl DestinationSpec {
    pub fn entries(&self) -> Vec<&Destination> {
        match self {
            DestinationSpec::Single(d) => vec![d],
            DestinationSpec::Multi(list) => list.iter().collect(),
        }
    }
}

/// Returns the current UTC instant. Thin wrapper kept so the orchestrator's
/// single call site can be swapped for a fixed clock in deterministic tests.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
