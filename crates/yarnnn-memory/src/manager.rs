use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use crate::db::init_db;
use crate::error::{MemoryError, Result};
use crate::types::{ContextKey, ContextSource, UserContextEntry, WorkingMemoryInputs};

/// Rendered working-memory blocks are capped at roughly 2k tokens (§4.5).
const MAX_RENDERED_CHARS: usize = 8000;
/// In-process cache of loaded entries, invalidated on every write —
/// the teacher's `MemoryManager` 5-minute TTL cache generalized to
/// invalidate-on-write since UserContext writes are comparatively rare.
const MAX_CACHE_ENTRIES: usize = 256;

/// Owns the `UserContext` table: priority-ordered upserts and the entry
/// load that feeds working-memory assembly (§3, §4.5).
///
/// Thread-safe: wraps the SQLite connection in a `Mutex`, matching the
/// teacher's `skynet-memory::manager::MemoryManager`.
pub struct MemoryStore {
    db: Mutex<rusqlite::Connection>,
    cache: Mutex<HashMap<String, Vec<UserContextEntry>>>,
}

impl MemoryStore {
    pub fn new(conn: rusqlite::Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Upsert-with-priority (§3): a write whose source outranks the
    /// existing row's source always wins; a lower-priority write is
    /// dropped; equal priority overwrites (the newer observation wins).
    pub fn upsert(
        &self,
        user_id: &str,
        key: &ContextKey,
        value: &str,
        source: ContextSource,
        confidence: f64,
    ) -> Result<()> {
        let db = self.db.lock().expect("memory store mutex poisoned");
        let key_str = key.to_string();

        let existing: Option<ContextSource> = db
            .query_row(
                "SELECT source FROM user_context WHERE user_id = ?1 AND key = ?2",
                params![user_id, key_str],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .map(|s| match s.as_str() {
                "user_stated" => ContextSource::UserStated,
                "conversation" => ContextSource::Conversation,
                "feedback" => ContextSource::Feedback,
                _ => ContextSource::Pattern,
            });

        if let Some(existing_source) = existing {
            if source < existing_source {
                debug!(
                    user_id,
                    key = %key_str,
                    ?source,
                    ?existing_source,
                    "dropping lower-priority context write"
                );
                return Ok(());
            }
        }

        let source_str = match source {
            ContextSource::UserStated => "user_stated",
            ContextSource::Conversation => "conversation",
            ContextSource::Feedback => "feedback",
            ContextSource::Pattern => "pattern",
        };
        db.execute(
            "INSERT INTO user_context (user_id, key, value, source, confidence, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id, key) DO UPDATE SET
                value = excluded.value,
                source = excluded.source,
                confidence = excluded.confidence,
                updated_at = excluded.updated_at",
            params![user_id, key_str, value, source_str, confidence, Utc::now().to_rfc3339()],
        )?;
        drop(db);
        self.invalidate_cache(user_id);
        Ok(())
    }

    /// Delete a single context entry ("forget my timezone").
    pub fn forget(&self, user_id: &str, key: &ContextKey) -> Result<()> {
        let db = self.db.lock().expect("memory store mutex poisoned");
        let affected = db.execute(
            "DELETE FROM user_context WHERE user_id = ?1 AND key = ?2",
            params![user_id, key.to_string()],
        )?;
        drop(db);
        self.invalidate_cache(user_id);
        if affected == 0 {
            return Err(MemoryError::NotFound(key.to_string()));
        }
        Ok(())
    }

    /// Load every context entry for a user, most-recently-updated first.
    pub fn load_entries(&self, user_id: &str) -> Result<Vec<UserContextEntry>> {
        if let Some(cached) = self.get_cached(user_id) {
            return Ok(cached);
        }
        let db = self.db.lock().expect("memory store mutex poisoned");
        let mut stmt = db.prepare(
            "SELECT key, value, source, confidence, updated_at
             FROM user_context WHERE user_id = ?1 ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            let key_str: String = row.get(0)?;
            let source_str: String = row.get(2)?;
            let updated_at: String = row.get(4)?;
            Ok(UserContextEntry {
                user_id: user_id.to_string(),
                key: key_str.parse().unwrap_or(ContextKey::Summary),
                value: row.get(1)?,
                source: match source_str.as_str() {
                    "user_stated" => ContextSource::UserStated,
                    "conversation" => ContextSource::Conversation,
                    "feedback" => ContextSource::Feedback,
                    _ => ContextSource::Pattern,
                },
                confidence: row.get(3)?,
                updated_at: chrono::DateTime::parse_from_rfc3339(&updated_at)
                    .unwrap()
                    .with_timezone(&Utc),
            })
        })?;
        let entries: Vec<_> = rows.filter_map(|r| r.ok()).collect();
        drop(stmt);
        drop(db);

        let mut cache = self.cache.lock().expect("memory cache mutex poisoned");
        if cache.len() >= MAX_CACHE_ENTRIES {
            if let Some(k) = cache.keys().next().cloned() {
                cache.remove(&k);
            }
        }
        cache.insert(user_id.to_string(), entries.clone());
        Ok(entries)
    }

    /// ≤15 entries capped slice for the C3 reasoning pass prompt (§4.3).
    pub fn capped_entries(&self, user_id: &str, limit: usize) -> Result<Vec<UserContextEntry>> {
        let mut entries = self.load_entries(user_id)?;
        entries.truncate(limit);
        Ok(entries)
    }

    fn get_cached(&self, user_id: &str) -> Option<Vec<UserContextEntry>> {
        let cache = self.cache.lock().expect("memory cache mutex poisoned");
        cache.get(user_id).cloned()
    }

    fn invalidate_cache(&self, user_id: &str) {
        let mut cache = self.cache.lock().expect("memory cache mutex poisoned");
        cache.remove(user_id);
    }
}

/// Render the §4.5 working-memory block: profile, tone/verbosity, named
/// facts/instructions/preferences, recent deliverables, sync freshness,
/// system-state summary. Pure function over caller-gathered inputs so this
/// crate never depends on content-cache/deliverables/activity directly.
pub fn render_working_memory(inputs: &WorkingMemoryInputs) -> String {
    let mut out = String::new();

    let profile: Vec<_> = inputs
        .entries
        .iter()
        .filter(|e| e.key.is_profile_field())
        .collect();
    if !profile.is_empty() {
        out.push_str("## Profile\n");
        for e in &profile {
            push_line(&mut out, &format!("- {}: {}\n", e.key, e.value));
        }
    }

    let tone: Vec<_> = inputs
        .entries
        .iter()
        .filter(|e| matches!(e.key, ContextKey::Tone(_) | ContextKey::Verbosity(_)))
        .collect();
    if !tone.is_empty() {
        out.push_str("\n## Tone & verbosity\n");
        for e in &tone {
            push_line(&mut out, &format!("- {}: {}\n", e.key, e.value));
        }
    }

    let named: Vec<_> = inputs
        .entries
        .iter()
        .filter(|e| {
            matches!(
                e.key,
                ContextKey::Fact(_) | ContextKey::Instruction(_) | ContextKey::Preference(_) | ContextKey::Pattern(_)
            )
        })
        .collect();
    if !named.is_empty() {
        out.push_str("\n## Facts, instructions & preferences\n");
        for e in &named {
            push_line(&mut out, &format!("- {}: {}\n", e.key, e.value));
        }
    }

    if !inputs.recent_deliverables.is_empty() {
        out.push_str("\n## Recently updated deliverables\n");
        for d in inputs.recent_deliverables.iter().take(5) {
            push_line(
                &mut out,
                &format!("- {} (updated {})\n", d.title, d.updated_at.to_rfc3339()),
            );
        }
    }

    if !inputs.sync_freshness.is_empty() {
        out.push_str("\n## Sync freshness\n");
        for s in &inputs.sync_freshness {
            let last = s
                .last_synced_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string());
            push_line(
                &mut out,
                &format!("- {}: last synced {} ({} items)\n", s.platform.as_str(), last, s.item_count),
            );
        }
    }

    out.push_str("\n## System state\n");
    let last_pass = inputs
        .system_state
        .last_signal_pass_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    push_line(
        &mut out,
        &format!(
            "- last signal pass: {}\n- pending reviews: {}\n- failed jobs (24h): {}\n",
            last_pass, inputs.system_state.pending_reviews_count, inputs.system_state.failed_jobs_24h
        ),
    );

    out
}

fn push_line(out: &mut String, line: &str) {
    if out.len() + line.len() <= MAX_RENDERED_CHARS {
        out.push_str(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeliverableSummary, SyncFreshness, SystemStateSummary};
    use yarnnn_core::types::Platform;

    fn store() -> MemoryStore {
        MemoryStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn user_stated_outranks_pattern() {
        let store = store();
        store
            .upsert("u1", &ContextKey::Timezone, "UTC", ContextSource::UserStated, 1.0)
            .unwrap();
        store
            .upsert("u1", &ContextKey::Timezone, "PST", ContextSource::Pattern, 0.9)
            .unwrap();

        let entries = store.load_entries("u1").unwrap();
        let tz = entries.iter().find(|e| e.key == ContextKey::Timezone).unwrap();
        assert_eq!(tz.value, "UTC", "higher-priority write must not be overwritten");
    }

    #[test]
    fn higher_priority_write_overwrites_lower() {
        let store = store();
        store
            .upsert("u1", &ContextKey::Role, "engineer", ContextSource::Pattern, 0.5)
            .unwrap();
        store
            .upsert("u1", &ContextKey::Role, "manager", ContextSource::UserStated, 1.0)
            .unwrap();

        let entries = store.load_entries("u1").unwrap();
        let role = entries.iter().find(|e| e.key == ContextKey::Role).unwrap();
        assert_eq!(role.value, "manager");
    }

    #[test]
    fn forget_removes_entry() {
        let store = store();
        store
            .upsert("u1", &ContextKey::Name, "Ada", ContextSource::UserStated, 1.0)
            .unwrap();
        store.forget("u1", &ContextKey::Name).unwrap();
        assert!(store.load_entries("u1").unwrap().is_empty());
    }

    #[test]
    fn render_includes_all_sections() {
        let inputs = WorkingMemoryInputs {
            entries: vec![
                UserContextEntry {
                    user_id: "u1".into(),
                    key: ContextKey::Name,
                    value: "Ada".into(),
                    source: ContextSource::UserStated,
                    confidence: 1.0,
                    updated_at: Utc::now(),
                },
                UserContextEntry {
                    user_id: "u1".into(),
                    key: ContextKey::Fact("likes_terse_replies".into()),
                    value: "true".into(),
                    source: ContextSource::Feedback,
                    confidence: 0.8,
                    updated_at: Utc::now(),
                },
            ],
            recent_deliverables: vec![DeliverableSummary {
                deliverable_id: "d1".into(),
                title: "Weekly digest".into(),
                updated_at: Utc::now(),
            }],
            sync_freshness: vec![SyncFreshness {
                platform: Platform::Slack,
                last_synced_at: Some(Utc::now()),
                item_count: 42,
            }],
            system_state: SystemStateSummary {
                last_signal_pass_at: Some(Utc::now()),
                pending_reviews_count: 2,
                failed_jobs_24h: 0,
            },
        };

        let rendered = render_working_memory(&inputs);
        assert!(rendered.contains("## Profile"));
        assert!(rendered.contains("Ada"));
        assert!(rendered.contains("## Facts, instructions & preferences"));
        assert!(rendered.contains("## Recently updated deliverables"));
        assert!(rendered.contains("## Sync freshness"));
        assert!(rendered.contains("## System state"));
    }
}
