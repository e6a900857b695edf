use async_trait::async_trait;
use tracing::{error, info};
use yarnnn_core::types::Destination;

use crate::exporter::DestinationExporter;
use crate::types::{ExportResult, ExporterContext};

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Bot-token Slack delivery (§4.4 Step 6 "slack — supports message, thread,
/// blocks, dm_draft"). `dm_draft` looks the target user up by email, opens
/// a DM, then posts the draft as a message in it.
pub struct SlackExporter {
    http: reqwest::Client,
}

impl Default for SlackExporter {
    fn default() -> Self {
        Self { http: reqwest::Client::new() }
    }
}

impl SlackExporter {
    async fn deliver_dm_draft(&self, destination: &Destination, content: &str, context: &ExporterContext) -> ExportResult {
        let Some(user_email) = destination.options.get("user_email").and_then(|v| v.as_str()) else {
            return ExportResult::failed("dm_draft format requires user_email in options");
        };

        let lookup: serde_json::Value = match self
            .http
            .get(format!("{SLACK_API_BASE}/users.lookupByEmail"))
            .bearer_auth(&context.access_token)
            .query(&[("email", user_email)])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
        {
            Ok(r) => match r.json().await {
                Ok(v) => v,
                Err(e) => return ExportResult::failed(e.to_string()),
            },
            Err(e) => return ExportResult::failed(e.to_string()),
        };
        if !lookup.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
            let error = lookup.get("error").and_then(|v| v.as_str()).unwrap_or("lookup failed");
            return ExportResult::failed(format!("users.lookupByEmail: {error}"));
        }
        let Some(user_id) = lookup.get("user").and_then(|u| u.get("id")).and_then(|v| v.as_str()) else {
            return ExportResult::failed("users.lookupByEmail returned no user id");
        };

        let open: serde_json::Value = match self
            .http
            .post(format!("{SLACK_API_BASE}/conversations.open"))
            .bearer_auth(&context.access_token)
            .json(&serde_json::json!({ "users": user_id }))
            .send()
            .await
        {
            Ok(r) => match r.json().await {
                Ok(v) => v,
                Err(e) => return ExportResult::failed(e.to_string()),
            },
            Err(e) => return ExportResult::failed(e.to_string()),
        };
        let Some(channel_id) = open.get("channel").and_then(|c| c.get("id")).and_then(|v| v.as_str()) else {
            return ExportResult::failed("conversations.open returned no channel id");
        };

        self.post_message(channel_id, content, None, context).await
    }

    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
        context: &ExporterContext,
    ) -> ExportResult {
        let mut body = serde_json::json!({ "channel": channel, "text": text });
        if let Some(ts) = thread_ts {
            body["thread_ts"] = serde_json::Value::String(ts.to_string());
        }

        let response = match self
            .http
            .post(format!("{SLACK_API_BASE}/chat.postMessage"))
            .bearer_auth(&context.access_token)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "slack delivery request failed");
                return ExportResult::failed(e.to_string());
            }
        };

        let parsed: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => return ExportResult::failed(e.to_string()),
        };
        if !parsed.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
            let error = parsed.get("error").and_then(|v| v.as_str()).unwrap_or("slack API error");
            return ExportResult::failed(error);
        }

        let ts = parsed.get("ts").and_then(|v| v.as_str()).map(str::to_string);
        info!(channel, ts = ?ts, "delivered via slack");
        ExportResult::success(ts, None)
    }
}

#[async_trait]
impl DestinationExporter for SlackExporter {
    fn platform(&self) -> &'static str {
        "slack"
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        &["message", "thread", "blocks", "dm_draft"]
    }

    fn validate_destination(&self, destination: &Destination) -> bool {
        if destination.target.is_empty() || !self.supported_formats().contains(&destination.format.as_str()) {
            return false;
        }
        match destination.format.as_str() {
            "thread" => destination.options.get("thread_ts").and_then(|v| v.as_str()).is_some(),
            "dm_draft" => destination.options.get("user_email").and_then(|v| v.as_str()).is_some(),
            _ => true,
        }
    }

    async fn deliver(
        &self,
        destination: &Destination,
        content: &str,
        _title: &str,
        _metadata: &serde_json::Map<String, serde_json::Value>,
        context: &ExporterContext,
    ) -> ExportResult {
        if destination.format == "dm_draft" {
            return self.deliver_dm_draft(destination, content, context).await;
        }
        let thread_ts = destination.options.get("thread_ts").and_then(|v| v.as_str());
        self.post_message(&destination.target, content, thread_ts, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exporter() -> SlackExporter {
        SlackExporter::default()
    }

    #[test]
    fn thread_destination_without_thread_ts_is_invalid() {
        let destination = Destination { platform: "slack".to_string(), target: "C1".to_string(), format: "thread".to_string(), options: Default::default() };
        assert!(!exporter().validate_destination(&destination));
    }

    #[test]
    fn dm_draft_without_user_email_is_invalid() {
        let destination = Destination { platform: "slack".to_string(), target: "C1".to_string(), format: "dm_draft".to_string(), options: Default::default() };
        assert!(!exporter().validate_destination(&destination));
    }

    #[test]
    fn message_destination_is_valid() {
        let destination = Destination { platform: "slack".to_string(), target: "C1".to_string(), format: "message".to_string(), options: Default::default() };
        assert!(exporter().validate_destination(&destination));
    }
}
