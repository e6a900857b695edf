use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;

use yarnnn_content_cache::{ContentType, Resource};
use yarnnn_core::types::Platform;

use crate::client::PlatformClient;
use crate::error::{PlatformSyncError, Result};
use crate::types::FetchedItem;

use super::{classify_status, tag_resource_id};

const WINDOW_DAYS: i64 = 7;

/// Calendar event sync (§4.2 contract table row 4): next 7 days, using an
/// incremental `sync_token` when the caller has one cached in
/// `provider_metadata`; on `410 Gone` the caller should drop the token and
/// retry with a full-window fetch (signalled by [`PlatformSyncError::Gone`]).
pub struct CalendarClient {
    http: reqwest::Client,
}

impl CalendarClient {
    pub fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }

    async fn fetch_events(&self, access_token: &str, calendar_id: &str, sync_token: Option<&str>) -> Result<Vec<FetchedItem>> {
        let now = Utc::now();
        let window_end = now + Duration::days(WINDOW_DAYS);

        let mut query = vec![("singleEvents", "true".to_string()), ("maxResults", "250".to_string())];
        if let Some(token) = sync_token {
            query.push(("syncToken", token.to_string()));
        } else {
            query.push(("timeMin", now.to_rfc3339()));
            query.push(("timeMax", window_end.to_rfc3339()));
        }

        let resp = self
            .http
            .get(format!(
                "https://www.googleapis.com/calendar/v3/calendars/{}/events",
                urlencode(calendar_id)
            ))
            .bearer_auth(access_token)
            .query(&query)
            .send()
            .await
            .map_err(|e| PlatformSyncError::Transient(e.to_string()))?;

        if resp.status().as_u16() == 410 {
            return Err(PlatformSyncError::Gone("sync token expired, full window refetch required".to_string()));
        }
        if !resp.status().is_success() {
            return Err(classify_status(resp.status(), "events.list failed"));
        }

        let body: Value = resp.json().await.map_err(|e| PlatformSyncError::Transient(e.to_string()))?;
        let events = body.get("items").and_then(Value::as_array).cloned().unwrap_or_default();

        let mut items = Vec::with_capacity(events.len());
        for event in events {
            let Some(id) = event.get("id").and_then(Value::as_str) else { continue };
            let summary = event.get("summary").and_then(Value::as_str).unwrap_or("(no title)");
            let start = event
                .get("start")
                .and_then(|s| s.get("dateTime").or_else(|| s.get("date")))
                .and_then(Value::as_str);
            let source_timestamp = start
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc));

            let metadata = tag_resource_id(Default::default(), calendar_id);

            items.push(FetchedItem {
                external_id: id.to_string(),
                content: summary.to_string(),
                content_type: ContentType::Event,
                source_timestamp,
                metadata,
            });
        }
        Ok(items)
    }
}

impl Default for CalendarClient {
    fn default() -> Self {
        Self::new()
    }
}

fn urlencode(s: &str) -> String {
    // Calendar IDs are email-shaped; `@` is the only reserved character we
    // expect to see in practice.
    s.replace('@', "%40")
}

#[async_trait]
impl PlatformClient for CalendarClient {
    fn platform(&self) -> Platform {
        Platform::Calendar
    }

    async fn fetch_landscape(&self, access_token: &str) -> Result<Vec<Resource>> {
        let resp = self
            .http
            .get("https://www.googleapis.com/calendar/v3/users/me/calendarList")
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| PlatformSyncError::Transient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(classify_status(resp.status(), "calendarList.list failed"));
        }

        let body: Value = resp.json().await.map_err(|e| PlatformSyncError::Transient(e.to_string()))?;
        let calendars = body.get("items").and_then(Value::as_array).cloned().unwrap_or_default();

        Ok(calendars
            .into_iter()
            .filter_map(|c| {
                let id = c.get("id")?.as_str()?.to_string();
                let name = c.get("summary")?.as_str()?.to_string();
                Some(Resource { id, name, resource_type: "calendar".to_string(), metadata: Default::default() })
            })
            .collect())
    }

    async fn fetch_selected(
        &self,
        access_token: &str,
        selected_sources: &[String],
    ) -> Result<Vec<(String, Result<Vec<FetchedItem>>)>> {
        // Full-window fetch per call; `sync_token` reuse needs the cursor
        // threaded in from the caller's SyncRegistry row, which the
        // `PlatformClient` trait doesn't expose today.
        let mut results = Vec::with_capacity(selected_sources.len());
        for calendar_id in selected_sources {
            let outcome = self.fetch_events(access_token, calendar_id, None).await;
            results.push((calendar_id.clone(), outcome));
        }
        Ok(results)
    }

    async fn send(&self, _access_token: &str, _target: &str, _content: &str) -> Result<()> {
        Err(PlatformSyncError::NoClient("calendar does not support direct send".to_string()))
    }
}
