use chrono::{Duration, Utc};

use yarnnn_content_cache::{ContentCache, ContentFilters};
use yarnnn_core::types::Platform;

use crate::error::Result;
use crate::types::{PlatformDigest, SignalSummary, PLATFORM_WINDOWS};

/// Per-platform item cap in the digest text — keeps the reasoning prompt
/// bounded regardless of how much content a busy user has synced.
const DIGEST_ITEM_CAP: usize = 12;

/// §4.3 Step 1: reads live content snippets from the Content Cache across
/// all four platforms and produces a bounded textual digest per platform.
/// A platform with zero live rows in its window contributes `None`, not an
/// empty digest — `SignalSummary::has_signals` relies on that distinction.
pub fn extract_signal_summary(cache: &ContentCache, user_id: &str) -> Result<SignalSummary> {
    let now = Utc::now();
    let mut summary = SignalSummary::default();

    for window in PLATFORM_WINDOWS {
        let (since, until) = if window.forward {
            (now, now + Duration::days(window.lookback_days))
        } else {
            (now - Duration::days(window.lookback_days), now)
        };

        let filters = ContentFilters { platform: Some(window.platform), since: Some(since), until: Some(until), ..Default::default() };
        let rows = cache.query(user_id, &filters, 200)?;

        let digest = if rows.is_empty() {
            None
        } else {
            let items_count = rows.len();
            let content_summary = rows
                .iter()
                .take(DIGEST_ITEM_CAP)
                .map(|r| truncate(&r.item.content, 200))
                .collect::<Vec<_>>()
                .join("\n");
            Some(PlatformDigest { items_count, time_range_start: since, time_range_end: until, content_summary })
        };

        match window.platform {
            Platform::Calendar => summary.calendar_content = digest,
            Platform::Gmail => summary.gmail_content = digest,
            Platform::Slack => summary.slack_content = digest,
            Platform::Notion => summary.notion_content = digest,
        }
    }

    Ok(summary)
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.replace('\n', " ")
    } else {
        let mut t: String = s.chars().take(max_chars).collect();
        t.push('…');
        t.replace('\n', " ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yarnnn_content_cache::{ContentType, PlatformContentItem};

    fn cache() -> ContentCache {
        ContentCache::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap()
    }

    fn item(platform: Platform, external_id: &str, content: &str) -> PlatformContentItem {
        PlatformContentItem {
            user_id: "u1".to_string(),
            platform,
            resource_id: "r1".to_string(),
            external_id: external_id.to_string(),
            content: content.to_string(),
            content_type: ContentType::Message,
            metadata: Default::default(),
            source_timestamp: Some(Utc::now()),
            fetched_at: Utc::now(),
            retained: false,
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    #[test]
    fn platform_with_no_rows_is_absent_not_empty() {
        let cache = cache();
        let summary = extract_signal_summary(&cache, "u1").unwrap();
        assert!(summary.slack_content.is_none());
        assert!(!summary.has_signals());
    }

    #[test]
    fn populated_platform_produces_a_digest_with_item_count() {
        let cache = cache();
        cache.upsert_items(&[item(Platform::Slack, "m1", "hello team")], 24).unwrap();
        let summary = extract_signal_summary(&cache, "u1").unwrap();
        let digest = summary.slack_content.unwrap();
        assert_eq!(digest.items_count, 1);
        assert!(digest.content_summary.contains("hello team"));
    }
}
