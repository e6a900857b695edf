use async_trait::async_trait;
use tracing::{error, info};
use yarnnn_core::types::Destination;

use crate::exporter::DestinationExporter;
use crate::providers::markdown_to_html;
use crate::types::{ExportResult, ExporterContext};

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Default email delivery channel (§4.4 Step 6 "resend (email default)") —
/// server-side API key, no user OAuth, works regardless of the user's
/// platform connections. Registered under the `email` alias.
pub struct ResendExporter {
    http: reqwest::Client,
    api_key: String,
    from_address: String,
}

impl ResendExporter {
    pub fn new(api_key: String, from_address: String) -> Self {
        Self { http: reqwest::Client::new(), api_key, from_address }
    }
}

#[async_trait]
impl DestinationExporter for ResendExporter {
    fn platform(&self) -> &'static str {
        "resend"
    }

    fn requires_auth(&self) -> bool {
        false
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        &["html", "send"]
    }

    fn validate_destination(&self, destination: &Destination) -> bool {
        destination.target.contains('@')
    }

    async fn deliver(
        &self,
        destination: &Destination,
        content: &str,
        title: &str,
        _metadata: &serde_json::Map<String, serde_json::Value>,
        _context: &ExporterContext,
    ) -> ExportResult {
        let subject = destination
            .options
            .get("subject")
            .and_then(|v| v.as_str())
            .unwrap_or(title);
        let html_body = markdown_to_html(subject, content);

        let body = serde_json::json!({
            "from": self.from_address,
            "to": [destination.target],
            "subject": subject,
            "html": html_body,
            "text": content,
        });

        let response = match self.http.post(RESEND_API_URL).bearer_auth(&self.api_key).json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "resend delivery request failed");
                return ExportResult::failed(e.to_string());
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, %body, "resend API returned an error");
            return ExportResult::failed(format!("resend API error {status}: {body}"));
        }

        let parsed: serde_json::Value = response.json().await.unwrap_or_default();
        let message_id = parsed.get("id").and_then(|v| v.as_str()).map(str::to_string);
        info!(to = %destination.target, message_id = ?message_id, "delivered via resend");
        ExportResult::success(message_id, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_destination_without_an_at_sign() {
        let exporter = ResendExporter::new("key".to_string(), "noreply@yarnnn.app".to_string());
        let destination = Destination { platform: "email".to_string(), target: "not-an-email".to_string(), format: "html".to_string(), options: Default::default() };
        assert!(!exporter.validate_destination(&destination));
    }
}
