use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;

use yarnnn_content_cache::{ContentType, Resource};
use yarnnn_core::types::Platform;

use crate::client::PlatformClient;
use crate::error::{PlatformSyncError, Result};
use crate::types::FetchedItem;

use super::{classify_status, tag_resource_id};

const MESSAGES_PER_LABEL: usize = 50;
const WINDOW_DAYS: i64 = 7;

/// Gmail message sync (§4.2 contract table row 2): 50 messages per
/// selected label, last 7 days, with retry handled by the caller's
/// `retry_with_backoff` wrapper around `fetch_selected` — this client only
/// needs to report 429/5xx as [`PlatformSyncError::Transient`].
pub struct GmailClient {
    http: reqwest::Client,
}

impl GmailClient {
    pub fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }

    async fn list_message_ids(&self, access_token: &str, label_id: &str) -> Result<Vec<String>> {
        let since = Utc::now() - Duration::days(WINDOW_DAYS);
        let query = format!("after:{}", since.timestamp());

        let resp = self
            .http
            .get("https://gmail.googleapis.com/gmail/v1/users/me/messages")
            .bearer_auth(access_token)
            .query(&[
                ("labelIds", label_id),
                ("q", query.as_str()),
                ("maxResults", &MESSAGES_PER_LABEL.to_string()),
            ])
            .send()
            .await
            .map_err(|e| PlatformSyncError::Transient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(classify_status(resp.status(), "messages.list failed"));
        }

        let body: Value = resp.json().await.map_err(|e| PlatformSyncError::Transient(e.to_string()))?;
        Ok(body
            .get("messages")
            .and_then(Value::as_array)
            .map(|msgs| msgs.iter().filter_map(|m| m.get("id")?.as_str().map(str::to_string)).collect())
            .unwrap_or_default())
    }

    async fn fetch_message(&self, access_token: &str, label_id: &str, message_id: &str) -> Result<FetchedItem> {
        let resp = self
            .http
            .get(format!("https://gmail.googleapis.com/gmail/v1/users/me/messages/{message_id}"))
            .bearer_auth(access_token)
            .query(&[("format", "full")])
            .send()
            .await
            .map_err(|e| PlatformSyncError::Transient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(classify_status(resp.status(), "messages.get failed"));
        }

        let body: Value = resp.json().await.map_err(|e| PlatformSyncError::Transient(e.to_string()))?;
        let snippet = body.get("snippet").and_then(Value::as_str).unwrap_or_default().to_string();
        let internal_date = body
            .get("internalDate")
            .and_then(Value::as_str)
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(|ms| chrono::DateTime::from_timestamp_millis(ms));

        let metadata = tag_resource_id(Default::default(), label_id);

        Ok(FetchedItem {
            external_id: message_id.to_string(),
            content: snippet,
            content_type: ContentType::Email,
            source_timestamp: internal_date,
            metadata,
        })
    }
}

impl Default for GmailClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformClient for GmailClient {
    fn platform(&self) -> Platform {
        Platform::Gmail
    }

    async fn fetch_landscape(&self, access_token: &str) -> Result<Vec<Resource>> {
        let resp = self
            .http
            .get("https://gmail.googleapis.com/gmail/v1/users/me/labels")
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| PlatformSyncError::Transient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(classify_status(resp.status(), "labels.list failed"));
        }

        let body: Value = resp.json().await.map_err(|e| PlatformSyncError::Transient(e.to_string()))?;
        let labels = body.get("labels").and_then(Value::as_array).cloned().unwrap_or_default();

        Ok(labels
            .into_iter()
            .filter_map(|l| {
                let id = l.get("id")?.as_str()?.to_string();
                let name = l.get("name")?.as_str()?.to_string();
                Some(Resource { id, name, resource_type: "label".to_string(), metadata: Default::default() })
            })
            .collect())
    }

    async fn fetch_selected(
        &self,
        access_token: &str,
        selected_sources: &[String],
    ) -> Result<Vec<(String, Result<Vec<FetchedItem>>)>> {
        let mut results = Vec::with_capacity(selected_sources.len());
        for label_id in selected_sources {
            let outcome: Result<Vec<FetchedItem>> = async {
                let mut items = Vec::new();
                for message_id in self.list_message_ids(access_token, label_id).await? {
                    items.push(self.fetch_message(access_token, label_id, &message_id).await?);
                }
                Ok(items)
            }
            .await;
            results.push((label_id.clone(), outcome));
        }
        Ok(results)
    }

    async fn send(&self, access_token: &str, target: &str, content: &str) -> Result<()> {
        let raw = build_raw_message(target, content);
        let resp = self
            .http
            .post("https://gmail.googleapis.com/gmail/v1/users/me/messages/send")
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "raw": raw }))
            .send()
            .await
            .map_err(|e| PlatformSyncError::Transient(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(classify_status(resp.status(), "messages.send failed"));
        }
        Ok(())
    }
}

fn build_raw_message(to: &str, body: &str) -> String {
    use base64::Engine;
    let mime = format!("To: {to}\r\nSubject: yarnnn\r\nContent-Type: text/plain; charset=UTF-8\r\n\r\n{body}");
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(mime)
}
