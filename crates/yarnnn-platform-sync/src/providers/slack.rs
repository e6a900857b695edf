use async_trait::async_trait;
use serde_json::Value;

use yarnnn_content_cache::{ContentType, Resource};
use yarnnn_core::types::Platform;

use crate::client::PlatformClient;
use crate::error::{PlatformSyncError, Result};
use crate::types::FetchedItem;

use super::{classify_status, tag_resource_id};

const MESSAGES_PER_CHANNEL: u32 = 50;

/// Channel message sync (§4.2 contract table row 1): 50 messages per
/// selected channel, auto-joining public channels on `not_in_channel` and
/// silently skipping channels the bot lacks permission for.
pub struct SlackClient {
    http: reqwest::Client,
}

impl SlackClient {
    pub fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }

    async fn join_channel(&self, access_token: &str, channel_id: &str) -> Result<()> {
        let resp = self
            .http
            .post("https://slack.com/api/conversations.join")
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "channel": channel_id }))
            .send()
            .await
            .map_err(|e| PlatformSyncError::Transient(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(classify_status(resp.status(), "conversations.join failed"));
        }
        Ok(())
    }

    async fn fetch_channel_history(&self, access_token: &str, channel_id: &str) -> Result<Vec<FetchedItem>> {
        // One retry after an auto-join covers the only self-healing case
        // (`not_in_channel`); anything else is terminal for this channel.
        let mut joined = false;
        let body = loop {
            let resp = self
                .http
                .get("https://slack.com/api/conversations.history")
                .bearer_auth(access_token)
                .query(&[("channel", channel_id), ("limit", &MESSAGES_PER_CHANNEL.to_string())])
                .send()
                .await
                .map_err(|e| PlatformSyncError::Transient(e.to_string()))?;

            if !resp.status().is_success() {
                return Err(classify_status(resp.status(), "conversations.history failed"));
            }

            let body: Value = resp.json().await.map_err(|e| PlatformSyncError::Transient(e.to_string()))?;

            if body.get("ok").and_then(Value::as_bool) == Some(true) {
                break body;
            }

            let err = body.get("error").and_then(Value::as_str).unwrap_or("unknown_error");
            if err == "not_in_channel" && !joined {
                self.join_channel(access_token, channel_id).await?;
                joined = true;
                continue;
            }
            if err == "missing_scope" || err == "channel_not_found" {
                return Ok(Vec::new());
            }
            return Err(PlatformSyncError::Transient(format!("slack api error: {err}")));
        };

        let messages = body.get("messages").and_then(Value::as_array).cloned().unwrap_or_default();
        let mut items = Vec::with_capacity(messages.len());
        for msg in messages {
            let ts = msg.get("ts").and_then(Value::as_str).unwrap_or_default().to_string();
            let text = msg.get("text").and_then(Value::as_str).unwrap_or_default().to_string();
            let source_timestamp = ts
                .split('.')
                .next()
                .and_then(|secs| secs.parse::<i64>().ok())
                .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0));

            let metadata = tag_resource_id(
                serde_json::Map::from_iter([("ts".to_string(), Value::String(ts.clone()))]),
                channel_id,
            );

            items.push(FetchedItem {
                external_id: ts,
                content: text,
                content_type: ContentType::Message,
                source_timestamp,
                metadata,
            });
        }
        Ok(items)
    }
}

impl Default for SlackClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformClient for SlackClient {
    fn platform(&self) -> Platform {
        Platform::Slack
    }

    async fn fetch_landscape(&self, access_token: &str) -> Result<Vec<Resource>> {
        let resp = self
            .http
            .get("https://slack.com/api/conversations.list")
            .bearer_auth(access_token)
            .query(&[("types", "public_channel,private_channel"), ("limit", "200")])
            .send()
            .await
            .map_err(|e| PlatformSyncError::Transient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(classify_status(resp.status(), "conversations.list failed"));
        }

        let body: Value = resp.json().await.map_err(|e| PlatformSyncError::Transient(e.to_string()))?;
        let channels = body.get("channels").and_then(Value::as_array).cloned().unwrap_or_default();

        Ok(channels
            .into_iter()
            .filter_map(|c| {
                let id = c.get("id")?.as_str()?.to_string();
                let name = c.get("name")?.as_str()?.to_string();
                Some(Resource { id, name, resource_type: "channel".to_string(), metadata: Default::default() })
            })
            .collect())
    }

    async fn fetch_selected(
        &self,
        access_token: &str,
        selected_sources: &[String],
    ) -> Result<Vec<(String, Result<Vec<FetchedItem>>)>> {
        let mut results = Vec::with_capacity(selected_sources.len());
        for channel_id in selected_sources {
            let outcome = self.fetch_channel_history(access_token, channel_id).await;
            results.push((channel_id.clone(), outcome));
        }
        Ok(results)
    }

    async fn send(&self, access_token: &str, target: &str, content: &str) -> Result<()> {
        let resp = self
            .http
            .post("https://slack.com/api/chat.postMessage")
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "channel": target, "text": content }))
            .send()
            .await
            .map_err(|e| PlatformSyncError::Transient(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(classify_status(resp.status(), "chat.postMessage failed"));
        }
        Ok(())
    }
}
