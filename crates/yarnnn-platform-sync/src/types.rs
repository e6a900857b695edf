use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use yarnnn_core::types::{ConnectionStatus, Platform, PlatformConnectionId, Tier, UserId};

/// Encrypted OAuth/bot credentials for one `(user_id, platform)` connection
/// (§3). `access_ciphertext`/`refresh_ciphertext` are `TokenCipher` output —
/// base64(nonce || ciphertext) — never plaintext at rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub access_ciphertext: String,
    pub refresh_ciphertext: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// `(user_id, platform)` unique (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConnection {
    pub id: PlatformConnectionId,
    pub user_id: UserId,
    pub platform: Platform,
    pub credentials: Credentials,
    #[serde(default)]
    pub provider_metadata: serde_json::Map<String, serde_json::Value>,
    pub status: ConnectionStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub landscape_discovered_at: Option<DateTime<Utc>>,
}

/// One fetched unit of platform content, prior to being written into the
/// content cache as a `PlatformContentItem`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedItem {
    pub external_id: String,
    pub content: String,
    pub content_type: yarnnn_content_cache::ContentType,
    pub source_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Outcome of one `sync_platform` call (§4.2 "Operations").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub items_synced: i64,
    pub per_resource_counts: std::collections::HashMap<String, i64>,
    pub errors: Vec<SyncResourceError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResourceError {
    pub resource_id: String,
    pub message: String,
}

/// Minimum inter-sync gap per cadence (§4.2), enforced regardless of tick
/// frequency so a 5-minute dispatcher tick never double-runs a sync.
#[derive(Debug, Clone, Copy)]
pub enum Cadence {
    TwiceDaily,
    FourTimesDaily,
    Hourly,
}

impl Cadence {
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Free => Cadence::TwiceDaily,
            Tier::Starter => Cadence::FourTimesDaily,
            Tier::Pro => Cadence::Hourly,
        }
    }

    fn min_gap(&self) -> Duration {
        match self {
            Cadence::Hourly => Duration::minutes(45),
            Cadence::FourTimesDaily => Duration::hours(4),
            Cadence::TwiceDaily => Duration::hours(6),
        }
    }
}

/// `should_sync_now(cadence, last_sync)` (§4.2) — timezone resolution is the
/// caller's concern (cadence is a pure interval check once the tick fires);
/// the minimum gap is what actually prevents double-runs.
pub fn should_sync_now(cadence: Cadence, now: DateTime<Utc>, last_synced_at: Option<DateTime<Utc>>) -> bool {
    match last_synced_at {
        None => true,
        Some(last) => now - last >= cadence.min_gap(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_synced_is_always_due() {
        assert!(should_sync_now(Cadence::Hourly, Utc::now(), None));
    }

    #[test]
    fn hourly_blocks_within_45_minutes() {
        let now = Utc::now();
        let last = now - Duration::minutes(30);
        assert!(!should_sync_now(Cadence::Hourly, now, Some(last)));
    }

    #[test]
    fn hourly_allows_after_45_minutes() {
        let now = Utc::now();
        let last = now - Duration::minutes(50);
        assert!(should_sync_now(Cadence::Hourly, now, Some(last)));
    }

    #[test]
    fn twice_daily_requires_six_hour_gap() {
        let now = Utc::now();
        assert!(!should_sync_now(Cadence::TwiceDaily, now, Some(now - Duration::hours(5))));
        assert!(should_sync_now(Cadence::TwiceDaily, now, Some(now - Duration::hours(6))));
    }
}
