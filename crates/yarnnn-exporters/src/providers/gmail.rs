use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tracing::{error, info};
use yarnnn_core::types::Destination;

use crate::exporter::DestinationExporter;
use crate::providers::markdown_to_html;
use crate::types::{ExportResult, ExporterContext};

const GMAIL_SEND_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";
const GMAIL_DRAFT_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/drafts";

/// User-OAuth Gmail delivery (§4.4 Step 6 "gmail — user OAuth;
/// format ∈ {send, draft, reply, html}"). `html` behaves like `send` but
/// always renders markdown to an HTML body rather than plain text.
pub struct GmailExporter {
    http: reqwest::Client,
}

impl Default for GmailExporter {
    fn default() -> Self {
        Self { http: reqwest::Client::new() }
    }
}

#[async_trait]
impl DestinationExporter for GmailExporter {
    fn platform(&self) -> &'static str {
        "gmail"
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        &["send", "draft", "reply", "html"]
    }

    fn validate_destination(&self, destination: &Destination) -> bool {
        destination.target.contains('@') && self.supported_formats().contains(&destination.format.as_str())
    }

    async fn deliver(
        &self,
        destination: &Destination,
        content: &str,
        title: &str,
        _metadata: &serde_json::Map<String, serde_json::Value>,
        context: &ExporterContext,
    ) -> ExportResult {
        let subject = destination.options.get("subject").and_then(|v| v.as_str()).unwrap_or(title);
        let (body, content_type) = if destination.format == "html" {
            (markdown_to_html(subject, content), "text/html; charset=utf-8")
        } else {
            (content.to_string(), "text/plain; charset=utf-8")
        };

        let raw = build_raw_message(&destination.target, subject, &body, content_type);
        let is_draft = destination.format == "draft";
        let envelope = serde_json::json!({ "raw": raw });
        let payload = if is_draft { serde_json::json!({ "message": envelope }) } else { envelope };
        let url = if is_draft { GMAIL_DRAFT_URL } else { GMAIL_SEND_URL };

        let response = match self.http.post(url).bearer_auth(&context.access_token).json(&payload).send().await {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "gmail delivery request failed");
                return ExportResult::failed(e.to_string());
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, %body, "gmail API returned an error");
            return ExportResult::failed(format!("gmail API error {status}: {body}"));
        }

        let parsed: serde_json::Value = response.json().await.unwrap_or_default();
        let external_id = parsed
            .get("id")
            .or_else(|| parsed.get("message").and_then(|m| m.get("id")))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        info!(to = %destination.target, format = %destination.format, "delivered via gmail");
        ExportResult::success(external_id, None)
    }
}

fn build_raw_message(to: &str, subject: &str, body: &str, content_type: &str) -> String {
    let mime = format!("To: {to}\r\nSubject: {subject}\r\nContent-Type: {content_type}\r\n\r\n{body}");
    URL_SAFE_NO_PAD.encode(mime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_format() {
        let exporter = GmailExporter::default();
        let destination = Destination { platform: "gmail".to_string(), target: "a@b.com".to_string(), format: "blocks".to_string(), options: Default::default() };
        assert!(!exporter.validate_destination(&destination));
    }

    #[test]
    fn raw_message_is_url_safe_base64() {
        let raw = build_raw_message("a@b.com", "hi", "body", "text/plain; charset=utf-8");
        assert!(!raw.contains('+') && !raw.contains('/'));
    }
}
