use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::{debug, warn};
use yarnnn_core::types::Platform;

use crate::db::init_db;
use crate::error::Result;
use crate::types::{
    ContentFilters, ContentId, ContentType, Landscape, PlatformContentItem, QueriedContent,
    Resource, SyncRegistryEntry,
};

/// Physical deletion only happens `grace` past expiry, so a row that just
/// crossed its TTL is still visible to in-flight readers for a window.
const PURGE_GRACE: Duration = Duration::hours(1);

/// The unified content store (C1, §4.1). Thread-safe: a single
/// `Mutex<Connection>` guards all writes, matching the teacher's
/// `skynet-memory::manager::MemoryManager`.
pub struct ContentCache {
    db: Mutex<rusqlite::Connection>,
}

impl ContentCache {
    pub fn new(conn: rusqlite::Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    /// Writes rows with `expires_at = now + ttl_hours`; on
    /// `(user_id, platform, resource_id, external_id)` conflict, updates in
    /// place. `retained` is the caller's choice, never inferred here.
    pub fn upsert_items(
        &self,
        items: &[PlatformContentItem],
        ttl_hours: i64,
    ) -> Result<usize> {
        let db = self.db.lock().expect("content cache mutex poisoned");
        let mut written = 0;
        for item in items {
            let expires_at = item.fetched_at + Duration::hours(ttl_hours);
            let metadata = serde_json::Value::Object(item.metadata.clone()).to_string();
            // Best-effort per row — one malformed row never fails the batch (§4.1 failure semantics).
            let outcome = db.execute(
                "INSERT INTO platform_content
                    (user_id, platform, resource_id, external_id, content, content_type,
                     metadata, source_timestamp, fetched_at, retained, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(user_id, platform, resource_id, external_id) DO UPDATE SET
                    content = excluded.content,
                    content_type = excluded.content_type,
                    metadata = excluded.metadata,
                    source_timestamp = excluded.source_timestamp,
                    fetched_at = excluded.fetched_at,
                    expires_at = excluded.expires_at",
                params![
                    item.user_id,
                    item.platform.as_str(),
                    item.resource_id,
                    item.external_id,
                    item.content,
                    item.content_type.as_str(),
                    metadata,
                    item.source_timestamp.map(|t| t.to_rfc3339()),
                    item.fetched_at.to_rfc3339(),
                    item.retained as i64,
                    expires_at.to_rfc3339(),
                ],
            );
            match outcome {
                Ok(_) => written += 1,
                Err(e) => warn!(
                    external_id = %item.external_id,
                    error = %e,
                    "failed to upsert content row, continuing batch"
                ),
            }
        }
        Ok(written)
    }

    /// Live rows (`retained OR expires_at > now`) matching `filters`,
    /// ordered by `fetched_at desc, source_timestamp desc` (§4.1).
    pub fn query(
        &self,
        user_id: &str,
        filters: &ContentFilters,
        limit: usize,
    ) -> Result<Vec<QueriedContent>> {
        let db = self.db.lock().expect("content cache mutex poisoned");
        let now = Utc::now().to_rfc3339();

        let mut sql = String::from(
            "SELECT id, user_id, platform, resource_id, external_id, content, content_type,
                    metadata, source_timestamp, fetched_at, retained, expires_at
             FROM platform_content
             WHERE user_id = ?1 AND (retained = 1 OR expires_at > ?2)",
        );
        let mut idx = 3;
        let mut bind_platform = None;
        let mut bind_since = None;
        let mut bind_until = None;

        if let Some(platform) = filters.platform {
            sql.push_str(&format!(" AND platform = ?{idx}"));
            bind_platform = Some(platform.as_str().to_string());
            idx += 1;
        }
        if let Some(since) = filters.since {
            sql.push_str(&format!(" AND fetched_at >= ?{idx}"));
            bind_since = Some(since.to_rfc3339());
            idx += 1;
        }
        if let Some(until) = filters.until {
            sql.push_str(&format!(" AND fetched_at <= ?{idx}"));
            bind_until = Some(until.to_rfc3339());
            idx += 1;
        }
        sql.push_str(" ORDER BY fetched_at DESC, source_timestamp DESC LIMIT ?");
        sql.push_str(&idx.to_string());

        let mut stmt = db.prepare(&sql)?;
        let mut param_values: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(user_id.to_string()), Box::new(now)];
        if let Some(p) = bind_platform {
            param_values.push(Box::new(p));
        }
        if let Some(s) = bind_since {
            param_values.push(Box::new(s));
        }
        if let Some(u) = bind_until {
            param_values.push(Box::new(u));
        }
        param_values.push(Box::new(limit as i64));

        let param_refs: Vec<&dyn rusqlite::ToSql> =
            param_values.iter().map(|b| b.as_ref()).collect();

        let rows = stmt.query_map(param_refs.as_slice(), row_to_content)?;
        let mut out = Vec::new();
        for row in rows {
            let item = row?;
            if let Some(resource_ids) = &filters.resource_ids {
                if !resource_ids.contains(&item.item.resource_id) {
                    continue;
                }
            }
            if let Some(content_types) = &filters.content_types {
                if !content_types.contains(&item.item.content_type) {
                    continue;
                }
            }
            out.push(item);
        }
        Ok(out)
    }

    /// Atomically sets `retained = true` for the given ids. Idempotent:
    /// calling twice yields identical state (§8 retention idempotence).
    pub fn retain(&self, ids: &[ContentId]) -> Result<()> {
        let db = self.db.lock().expect("content cache mutex poisoned");
        let tx = db.unchecked_transaction()?;
        for id in ids {
            tx.execute(
                "UPDATE platform_content SET retained = 1 WHERE id = ?1",
                params![id.0],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Physical deletion of rows past `expires_at + grace` that were never
    /// retained.
    pub fn purge_expired(&self) -> Result<usize> {
        let db = self.db.lock().expect("content cache mutex poisoned");
        let cutoff = (Utc::now() - PURGE_GRACE).to_rfc3339();
        let deleted = db.execute(
            "DELETE FROM platform_content WHERE retained = 0 AND expires_at < ?1",
            params![cutoff],
        )?;
        debug!(deleted, "purged expired content rows");
        Ok(deleted)
    }

    pub fn upsert_sync_registry(&self, entry: &SyncRegistryEntry) -> Result<()> {
        let db = self.db.lock().expect("content cache mutex poisoned");
        db.execute(
            "INSERT INTO sync_registry
                (user_id, platform, resource_id, last_synced_at, item_count, source_latest_at, cursor)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(user_id, platform, resource_id) DO UPDATE SET
                last_synced_at = excluded.last_synced_at,
                item_count = excluded.item_count,
                source_latest_at = excluded.source_latest_at,
                cursor = excluded.cursor",
            params![
                entry.user_id,
                entry.platform.as_str(),
                entry.resource_id,
                entry.last_synced_at.to_rfc3339(),
                entry.item_count,
                entry.source_latest_at.map(|t| t.to_rfc3339()),
                entry.cursor,
            ],
        )?;
        Ok(())
    }

    pub fn get_sync_registry(
        &self,
        user_id: &str,
        platform: Platform,
        resource_id: &str,
    ) -> Result<Option<SyncRegistryEntry>> {
        let db = self.db.lock().expect("content cache mutex poisoned");
        let row = db
            .query_row(
                "SELECT last_synced_at, item_count, source_latest_at, cursor
                 FROM sync_registry WHERE user_id = ?1 AND platform = ?2 AND resource_id = ?3",
                params![user_id, platform.as_str(), resource_id],
                |row| {
                    let last_synced_at: String = row.get(0)?;
                    let source_latest_at: Option<String> = row.get(2)?;
                    Ok(SyncRegistryEntry {
                        user_id: user_id.to_string(),
                        platform,
                        resource_id: resource_id.to_string(),
                        last_synced_at: DateTime::parse_from_rfc3339(&last_synced_at)
                            .unwrap()
                            .with_timezone(&Utc),
                        item_count: row.get(1)?,
                        source_latest_at: source_latest_at
                            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                            .map(|t| t.with_timezone(&Utc)),
                        cursor: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Per-platform sync state across every resource `user_id` has synced,
    /// aggregated for the working-memory "Sync freshness" section (§4.5):
    /// the most recent sync and the total item count per platform.
    pub fn sync_freshness_for_user(&self, user_id: &str) -> Result<Vec<(Platform, Option<DateTime<Utc>>, i64)>> {
        let db = self.db.lock().expect("content cache mutex poisoned");
        let mut stmt = db.prepare(
            "SELECT platform, MAX(last_synced_at), SUM(item_count)
             FROM sync_registry WHERE user_id = ?1 GROUP BY platform",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            let platform: String = row.get(0)?;
            let last_synced_at: Option<String> = row.get(1)?;
            let item_count: i64 = row.get(2)?;
            Ok((platform, last_synced_at, item_count))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (platform, last_synced_at, item_count) = row?;
            let Ok(platform) = platform.parse::<Platform>() else { continue };
            let last_synced_at = last_synced_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|t| t.with_timezone(&Utc));
            out.push((platform, last_synced_at, item_count));
        }
        Ok(out)
    }

    /// Re-reads the current `selected_sources` from the store immediately
    /// before writing the merged landscape, so a concurrent user edit to
    /// the selection is never clobbered (§4.1, §5 compare-then-swap).
    pub fn upsert_landscape(
        &self,
        connection_id: &str,
        resources: Vec<Resource>,
    ) -> Result<Landscape> {
        let db = self.db.lock().expect("content cache mutex poisoned");
        let tx = db.unchecked_transaction()?;

        let current_selected: Vec<String> = tx
            .query_row(
                "SELECT selected_sources FROM landscape WHERE connection_id = ?1",
                params![connection_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .map(|json| serde_json::from_str(&json).unwrap_or_default())
            .unwrap_or_default();

        let merged = Landscape::pruned(resources, &current_selected);

        tx.execute(
            "INSERT INTO landscape (connection_id, resources, selected_sources, discovered_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(connection_id) DO UPDATE SET
                resources = excluded.resources,
                selected_sources = excluded.selected_sources,
                discovered_at = excluded.discovered_at",
            params![
                connection_id,
                serde_json::to_string(&merged.resources).unwrap(),
                serde_json::to_string(&merged.selected_sources).unwrap(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(merged)
    }

    pub fn get_landscape(&self, connection_id: &str) -> Result<Option<Landscape>> {
        let db = self.db.lock().expect("content cache mutex poisoned");
        let row = db
            .query_row(
                "SELECT resources, selected_sources FROM landscape WHERE connection_id = ?1",
                params![connection_id],
                |row| {
                    let resources: String = row.get(0)?;
                    let selected_sources: String = row.get(1)?;
                    Ok(Landscape {
                        resources: serde_json::from_str(&resources).unwrap_or_default(),
                        selected_sources: serde_json::from_str(&selected_sources)
                            .unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}

fn row_to_content(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueriedContent> {
    let platform_str: String = row.get(2)?;
    let content_type_str: String = row.get(6)?;
    let metadata_str: String = row.get(7)?;
    let source_timestamp: Option<String> = row.get(8)?;
    let fetched_at: String = row.get(9)?;
    let expires_at: String = row.get(11)?;

    Ok(QueriedContent {
        id: ContentId(row.get(0)?),
        item: PlatformContentItem {
            user_id: row.get(1)?,
            platform: platform_str.parse().unwrap_or(Platform::Slack),
            resource_id: row.get(3)?,
            external_id: row.get(4)?,
            content: row.get(5)?,
            content_type: content_type_str.parse().unwrap_or(ContentType::Message),
            metadata: serde_json::from_str::<serde_json::Value>(&metadata_str)
                .ok()
                .and_then(|v| v.as_object().cloned())
                .unwrap_or_default(),
            source_timestamp: source_timestamp
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|t| t.with_timezone(&Utc)),
            fetched_at: DateTime::parse_from_rfc3339(&fetched_at)
                .unwrap()
                .with_timezone(&Utc),
            retained: row.get::<_, i64>(10)? != 0,
            expires_at: DateTime::parse_from_rfc3339(&expires_at)
                .unwrap()
                .with_timezone(&Utc),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cache() -> ContentCache {
        ContentCache::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap()
    }

    fn sample_item(external_id: &str) -> PlatformContentItem {
        PlatformContentItem {
            user_id: "u1".into(),
            platform: Platform::Slack,
            resource_id: "C123".into(),
            external_id: external_id.into(),
            content: "hello".into(),
            content_type: ContentType::Message,
            metadata: Default::default(),
            source_timestamp: Some(Utc::now()),
            fetched_at: Utc::now(),
            retained: false,
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn query_only_returns_live_rows() {
        let cache = test_cache();
        let mut expired = sample_item("m1");
        expired.fetched_at = Utc::now() - Duration::hours(100);
        cache.upsert_items(&[expired], -1).unwrap(); // ttl_hours negative -> already expired

        let live = sample_item("m2");
        cache.upsert_items(&[live], 24).unwrap();

        let results = cache.query("u1", &ContentFilters::default(), 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].item.external_id, "m2");
    }

    #[test]
    fn upsert_is_idempotent_on_external_key() {
        let cache = test_cache();
        let item = sample_item("m1");
        cache.upsert_items(&[item.clone()], 24).unwrap();
        cache.upsert_items(&[item], 24).unwrap();

        let results = cache.query("u1", &ContentFilters::default(), 10).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn retain_is_idempotent() {
        let cache = test_cache();
        cache.upsert_items(&[sample_item("m1")], 24).unwrap();
        let results = cache.query("u1", &ContentFilters::default(), 10).unwrap();
        let id = results[0].id.clone();

        cache.retain(&[id.clone()]).unwrap();
        cache.retain(&[id]).unwrap();

        let results = cache.query("u1", &ContentFilters::default(), 10).unwrap();
        assert!(results[0].item.retained);
    }

    #[test]
    fn retained_rows_survive_expiry() {
        let cache = test_cache();
        let mut item = sample_item("m1");
        item.fetched_at = Utc::now() - Duration::hours(100);
        cache.upsert_items(&[item], -1).unwrap();

        let results = cache.query("u1", &ContentFilters::default(), 10).unwrap();
        let id = results[0].id.clone();
        cache.retain(&[id]).unwrap();

        let results = cache.query("u1", &ContentFilters::default(), 10).unwrap();
        assert_eq!(results.len(), 1, "retained row must stay visible past expiry");
    }

    #[test]
    fn landscape_prunes_stale_selection_and_preserves_valid() {
        let cache = test_cache();
        let initial = vec![
            Resource { id: "a".into(), name: "A".into(), resource_type: "channel".into(), metadata: Default::default() },
            Resource { id: "b".into(), name: "B".into(), resource_type: "channel".into(), metadata: Default::default() },
        ];
        cache.upsert_landscape("conn1", initial).unwrap();

        // Simulate a user selecting both, then the upstream catalog losing "b".
        {
            let db = cache.db.lock().unwrap();
            db.execute(
                "UPDATE landscape SET selected_sources = ?1 WHERE connection_id = 'conn1'",
                params![serde_json::to_string(&vec!["a", "b"]).unwrap()],
            )
            .unwrap();
        }

        let refreshed = vec![Resource {
            id: "a".into(),
            name: "A".into(),
            resource_type: "channel".into(),
            metadata: Default::default(),
        }];
        let landscape = cache.upsert_landscape("conn1", refreshed).unwrap();
        assert_eq!(landscape.selected_sources, vec!["a".to_string()]);
    }
}
