use async_trait::async_trait;
use tracing::{error, info};
use yarnnn_core::types::Destination;

use crate::exporter::DestinationExporter;
use crate::types::{ExportResult, ExporterContext};

const NOTION_API_BASE: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

/// User-OAuth Notion delivery (§4.4 Step 6 "notion — supports page,
/// database_item, draft"). `draft` writes into a dedicated Drafts database
/// with `Status`, `Target Name`, `Target Location` properties.
pub struct NotionExporter {
    http: reqwest::Client,
}

impl Default for NotionExporter {
    fn default() -> Self {
        Self { http: reqwest::Client::new() }
    }
}

impl NotionExporter {
    async fn create_page(
        &self,
        access_token: &str,
        parent_key: &str,
        parent_id: &str,
        title: &str,
        content: &str,
        extra_properties: serde_json::Map<String, serde_json::Value>,
    ) -> ExportResult {
        let mut properties = extra_properties;
        properties.insert(
            "title".to_string(),
            serde_json::json!({ "title": [{ "type": "text", "text": { "content": title } }] }),
        );

        let body = serde_json::json!({
            "parent": { parent_key: parent_id },
            "properties": properties,
            "children": markdown_to_blocks(content),
        });

        let response = match self
            .http
            .post(format!("{NOTION_API_BASE}/pages"))
            .bearer_auth(access_token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "notion delivery request failed");
                return ExportResult::failed(e.to_string());
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, %body, "notion API returned an error");
            return ExportResult::failed(format!("notion API error {status}: {body}"));
        }

        let parsed: serde_json::Value = response.json().await.unwrap_or_default();
        let id = parsed.get("id").and_then(|v| v.as_str()).map(str::to_string);
        let url = parsed.get("url").and_then(|v| v.as_str()).map(str::to_string);
        info!(page_id = ?id, "delivered via notion");
        ExportResult::success(id, url)
    }
}

#[async_trait]
impl DestinationExporter for NotionExporter {
    fn platform(&self) -> &'static str {
        "notion"
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        &["page", "database_item", "draft"]
    }

    fn validate_destination(&self, destination: &Destination) -> bool {
        if destination.target.is_empty() || !self.supported_formats().contains(&destination.format.as_str()) {
            return false;
        }
        match destination.format.as_str() {
            "database_item" => destination.options.get("database_id").and_then(|v| v.as_str()).is_some(),
            "draft" => destination.options.get("drafts_database_id").and_then(|v| v.as_str()).is_some(),
            _ => true,
        }
    }

    async fn deliver(
        &self,
        destination: &Destination,
        content: &str,
        title: &str,
        _metadata: &serde_json::Map<String, serde_json::Value>,
        context: &ExporterContext,
    ) -> ExportResult {
        match destination.format.as_str() {
            "database_item" => {
                let Some(database_id) = destination.options.get("database_id").and_then(|v| v.as_str()) else {
                    return ExportResult::failed("database_item format requires database_id in options");
                };
                self.create_page(&context.access_token, "database_id", database_id, title, content, Default::default()).await
            }
            "draft" => {
                let Some(drafts_database_id) = destination.options.get("drafts_database_id").and_then(|v| v.as_str()) else {
                    return ExportResult::failed("draft format requires drafts_database_id in options");
                };
                let target_name = destination.options.get("target_name").and_then(|v| v.as_str()).unwrap_or(&destination.target);
                let target_location = destination.options.get("target_url").and_then(|v| v.as_str()).unwrap_or("");
                let mut properties = serde_json::Map::new();
                properties.insert("Status".to_string(), serde_json::json!({ "select": { "name": "Draft" } }));
                properties.insert("Target Name".to_string(), serde_json::json!({ "rich_text": [{ "type": "text", "text": { "content": target_name } }] }));
                properties.insert("Target Location".to_string(), serde_json::json!({ "url": target_location }));
                self.create_page(&context.access_token, "database_id", drafts_database_id, title, content, properties).await
            }
            _ => self.create_page(&context.access_token, "page_id", &destination.target, title, content, Default::default()).await,
        }
    }
}

/// Best-effort markdown → Notion block conversion: heading levels 1-3,
/// bulleted items, everything else a paragraph.
fn markdown_to_blocks(content: &str) -> Vec<serde_json::Value> {
    content
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(|line| {
            if let Some(text) = line.strip_prefix("### ") {
                heading_block("heading_3", text)
            } else if let Some(text) = line.strip_prefix("## ") {
                heading_block("heading_2", text)
            } else if let Some(text) = line.strip_prefix("# ") {
                heading_block("heading_1", text)
            } else if let Some(text) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
                serde_json::json!({
                    "object": "block",
                    "type": "bulleted_list_item",
                    "bulleted_list_item": { "rich_text": [{ "type": "text", "text": { "content": text } }] },
                })
            } else {
                serde_json::json!({
                    "object": "block",
                    "type": "paragraph",
                    "paragraph": { "rich_text": [{ "type": "text", "text": { "content": line } }] },
                })
            }
        })
        .collect()
}

fn heading_block(kind: &str, text: &str) -> serde_json::Value {
    serde_json::json!({
        "object": "block",
        "type": kind,
        kind: { "rich_text": [{ "type": "text", "text": { "content": text } }] },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exporter() -> NotionExporter {
        NotionExporter::default()
    }

    #[test]
    fn database_item_without_database_id_is_invalid() {
        let destination = Destination { platform: "notion".to_string(), target: "p1".to_string(), format: "database_item".to_string(), options: Default::default() };
        assert!(!exporter().validate_destination(&destination));
    }

    #[test]
    fn draft_without_drafts_database_id_is_invalid() {
        let destination = Destination { platform: "notion".to_string(), target: "p1".to_string(), format: "draft".to_string(), options: Default::default() };
        assert!(!exporter().validate_destination(&destination));
    }

    #[test]
    fn markdown_headings_become_heading_blocks() {
        let blocks = markdown_to_blocks("# Title\nbody line");
        assert_eq!(blocks[0]["type"], "heading_1");
        assert_eq!(blocks[1]["type"], "paragraph");
    }
}
