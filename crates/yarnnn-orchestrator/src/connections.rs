//! Persistence for `PlatformConnection` (§3, §6). `yarnnn_platform_sync`
//! treats connections as a pure data/logic concern and keeps no store of its
//! own — the orchestrator is where credentials actually live, following the
//! same `Mutex<Connection>` single-writer pattern every other store in this
//! workspace uses.

use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use yarnnn_core::types::{ConnectionStatus, Platform, PlatformConnectionId, Tier, UserId};
use yarnnn_platform_sync::{Credentials, PlatformConnection};

use crate::error::Result;

pub struct ConnectionStore {
    db: Mutex<rusqlite::Connection>,
}

impl ConnectionStore {
    pub fn new(conn: rusqlite::Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS platform_connections (
                id                     TEXT PRIMARY KEY,
                user_id                TEXT NOT NULL,
                platform               TEXT NOT NULL,
                tier                   TEXT NOT NULL DEFAULT 'free',
                access_ciphertext      TEXT NOT NULL,
                refresh_ciphertext     TEXT,
                expires_at             TEXT,
                provider_metadata      TEXT NOT NULL DEFAULT '{}',
                status                 TEXT NOT NULL,
                last_synced_at         TEXT,
                landscape_discovered_at TEXT,
                UNIQUE(user_id, platform)
            );
            CREATE INDEX IF NOT EXISTS idx_platform_connections_status
                ON platform_connections(status);",
        )?;
        Ok(Self { db: Mutex::new(conn) })
    }

    pub fn upsert(&self, connection: &PlatformConnection, tier: Tier) -> Result<()> {
        let db = self.db.lock().expect("connection store mutex poisoned");
        db.execute(
            "INSERT INTO platform_connections
                (id, user_id, platform, tier, access_ciphertext, refresh_ciphertext,
                 expires_at, provider_metadata, status, last_synced_at, landscape_discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(user_id, platform) DO UPDATE SET
                access_ciphertext = excluded.access_ciphertext,
                refresh_ciphertext = excluded.refresh_ciphertext,
                expires_at = excluded.expires_at,
                provider_metadata = excluded.provider_metadata,
                status = excluded.status,
                last_synced_at = excluded.last_synced_at,
                landscape_discovered_at = excluded.landscape_discovered_at",
            params![
                connection.id.as_str(),
                connection.user_id.as_str(),
                connection.platform.as_str(),
                tier_str(tier),
                connection.credentials.access_ciphertext,
                connection.credentials.refresh_ciphertext,
                connection.credentials.expires_at.map(|t| t.to_rfc3339()),
                serde_json::Value::Object(connection.provider_metadata.clone()).to_string(),
                status_str(connection.status),
                connection.last_synced_at.map(|t| t.to_rfc3339()),
                connection.landscape_discovered_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &PlatformConnectionId) -> Result<Option<PlatformConnection>> {
        let db = self.db.lock().expect("connection store mutex poisoned");
        let row = db
            .query_row(
                "SELECT id, user_id, platform, access_ciphertext, refresh_ciphertext, expires_at,
                        provider_metadata, status, last_synced_at, landscape_discovered_at
                 FROM platform_connections WHERE id = ?1",
                params![id.as_str()],
                row_to_connection,
            )
            .optional()?;
        Ok(row)
    }

    pub fn get_by_user_platform(&self, user_id: &str, platform: Platform) -> Result<Option<PlatformConnection>> {
        let db = self.db.lock().expect("connection store mutex poisoned");
        let row = db
            .query_row(
                "SELECT id, user_id, platform, access_ciphertext, refresh_ciphertext, expires_at,
                        provider_metadata, status, last_synced_at, landscape_discovered_at
                 FROM platform_connections WHERE user_id = ?1 AND platform = ?2",
                params![user_id, platform.as_str()],
                row_to_connection,
            )
            .optional()?;
        Ok(row)
    }

    /// Every connected `(connection, tier)` pair — the universe `due_syncs`
    /// filters down by cadence (§4.2).
    pub fn list_connected(&self) -> Result<Vec<(PlatformConnection, Tier)>> {
        let db = self.db.lock().expect("connection store mutex poisoned");
        let mut stmt = db.prepare(
            "SELECT id, user_id, platform, access_ciphertext, refresh_ciphertext, expires_at,
                    provider_metadata, status, last_synced_at, landscape_discovered_at, tier
             FROM platform_connections WHERE status = 'connected'",
        )?;
        let rows = stmt.query_map(params![], |row| {
            let connection = row_to_connection(row)?;
            let tier_str: String = row.get(10)?;
            Ok((connection, Tier::from_str(&tier_str).unwrap_or(Tier::Free)))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Distinct users with at least one connected platform — the population
    /// a signal pass considers (§4.3 Step 1).
    pub fn list_users_with_connections(&self) -> Result<Vec<UserId>> {
        let db = self.db.lock().expect("connection store mutex poisoned");
        let mut stmt = db.prepare(
            "SELECT DISTINCT user_id FROM platform_connections WHERE status = 'connected'",
        )?;
        let rows = stmt.query_map(params![], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(UserId::from(row?.as_str()));
        }
        Ok(out)
    }

    pub fn update_credentials(&self, id: &PlatformConnectionId, credentials: &Credentials) -> Result<()> {
        let db = self.db.lock().expect("connection store mutex poisoned");
        db.execute(
            "UPDATE platform_connections SET access_ciphertext = ?1, refresh_ciphertext = ?2, expires_at = ?3
             WHERE id = ?4",
            params![
                credentials.access_ciphertext,
                credentials.refresh_ciphertext,
                credentials.expires_at.map(|t| t.to_rfc3339()),
                id.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn update_after_sync(&self, id: &PlatformConnectionId, synced_at: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().expect("connection store mutex poisoned");
        db.execute(
            "UPDATE platform_connections SET last_synced_at = ?1 WHERE id = ?2",
            params![synced_at.to_rfc3339(), id.as_str()],
        )?;
        Ok(())
    }

    pub fn update_status(&self, id: &PlatformConnectionId, status: ConnectionStatus) -> Result<()> {
        let db = self.db.lock().expect("connection store mutex poisoned");
        db.execute(
            "UPDATE platform_connections SET status = ?1 WHERE id = ?2",
            params![status_str(status), id.as_str()],
        )?;
        Ok(())
    }
}

fn status_str(s: ConnectionStatus) -> &'static str {
    match s {
        ConnectionStatus::Connected => "connected",
        ConnectionStatus::Disconnected => "disconnected",
        ConnectionStatus::Error => "error",
    }
}

fn tier_str(t: Tier) -> &'static str {
    match t {
        Tier::Free => "free",
        Tier::Starter => "starter",
        Tier::Pro => "pro",
    }
}

fn row_to_connection(row: &rusqlite::Row<'_>) -> rusqlite::Result<PlatformConnection> {
    let id: String = row.get(0)?;
    let platform: String = row.get(2)?;
    let expires_at: Option<String> = row.get(5)?;
    let provider_metadata: String = row.get(6)?;
    let status: String = row.get(7)?;
    let last_synced_at: Option<String> = row.get(8)?;
    let landscape_discovered_at: Option<String> = row.get(9)?;

    Ok(PlatformConnection {
        id: PlatformConnectionId::from_str(&id).unwrap_or_default(),
        user_id: UserId::from(row.get::<_, String>(1)?.as_str()),
        platform: platform.parse().unwrap_or(Platform::Slack),
        credentials: Credentials {
            access_ciphertext: row.get(3)?,
            refresh_ciphertext: row.get(4)?,
            expires_at: expires_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|t| t.with_timezone(&Utc)),
        },
        provider_metadata: serde_json::from_str::<serde_json::Value>(&provider_metadata)
            .ok()
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default(),
        status: match status.as_str() {
            "disconnected" => ConnectionStatus::Disconnected,
            "error" => ConnectionStatus::Error,
            _ => ConnectionStatus::Connected,
        },
        last_synced_at: last_synced_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|t| t.with_timezone(&Utc)),
        landscape_discovered_at: landscape_discovered_at
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ConnectionStore {
        ConnectionStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap()
    }

    fn sample() -> PlatformConnection {
        PlatformConnection {
            id: PlatformConnectionId::new(),
            user_id: UserId::from("u1"),
            platform: Platform::Slack,
            credentials: Credentials { access_ciphertext: "ct".into(), refresh_ciphertext: None, expires_at: None },
            provider_metadata: Default::default(),
            status: ConnectionStatus::Connected,
            last_synced_at: None,
            landscape_discovered_at: None,
        }
    }

    #[test]
    fn round_trips_a_connection() {
        let store = store();
        let connection = sample();
        store.upsert(&connection, Tier::Pro).unwrap();

        let loaded = store.get(&connection.id).unwrap().unwrap();
        assert_eq!(loaded.user_id, connection.user_id);
        assert_eq!(loaded.platform, Platform::Slack);
    }

    #[test]
    fn upsert_on_same_user_platform_overwrites() {
        let store = store();
        let mut connection = sample();
        store.upsert(&connection, Tier::Free).unwrap();

        connection.credentials.access_ciphertext = "new-ct".into();
        store.upsert(&connection, Tier::Free).unwrap();

        let all = store.list_connected().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0.credentials.access_ciphertext, "new-ct");
    }

    #[test]
    fn list_users_with_connections_is_distinct() {
        let store = store();
        let mut a = sample();
        a.platform = Platform::Slack;
        let mut b = sample();
        b.id = PlatformConnectionId::new();
        b.platform = Platform::Gmail;
        store.upsert(&a, Tier::Free).unwrap();
        store.upsert(&b, Tier::Free).unwrap();

        let users = store.list_users_with_connections().unwrap();
        assert_eq!(users.len(), 1);
    }
}
