use async_trait::async_trait;
use serde_json::Value;

use yarnnn_content_cache::{ContentType, Resource};
use yarnnn_core::types::Platform;

use crate::client::PlatformClient;
use crate::error::{PlatformSyncError, Result};
use crate::types::FetchedItem;

use super::{classify_status, tag_resource_id};

const NOTION_VERSION: &str = "2022-06-28";

/// Notion page sync (§4.2 contract table row 3): direct fetch by page id,
/// children blocks flattened to plain text.
pub struct NotionClient {
    http: reqwest::Client,
}

impl NotionClient {
    pub fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }

    async fn fetch_page(&self, access_token: &str, page_id: &str) -> Result<FetchedItem> {
        let page_resp = self
            .http
            .get(format!("https://api.notion.com/v1/pages/{page_id}"))
            .bearer_auth(access_token)
            .header("Notion-Version", NOTION_VERSION)
            .send()
            .await
            .map_err(|e| PlatformSyncError::Transient(e.to_string()))?;

        if !page_resp.status().is_success() {
            return Err(classify_status(page_resp.status(), "pages.retrieve failed"));
        }

        let page: Value = page_resp.json().await.map_err(|e| PlatformSyncError::Transient(e.to_string()))?;
        let title = extract_title(&page);
        let last_edited = page
            .get("last_edited_time")
            .and_then(Value::as_str)
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc));

        let blocks_text = self.fetch_blocks_text(access_token, page_id).await?;
        let content = format!("{title}\n\n{blocks_text}");

        let metadata = tag_resource_id(Default::default(), page_id);

        Ok(FetchedItem {
            external_id: page_id.to_string(),
            content,
            content_type: ContentType::Page,
            source_timestamp: last_edited,
            metadata,
        })
    }

    async fn fetch_blocks_text(&self, access_token: &str, block_id: &str) -> Result<String> {
        let resp = self
            .http
            .get(format!("https://api.notion.com/v1/blocks/{block_id}/children"))
            .bearer_auth(access_token)
            .header("Notion-Version", NOTION_VERSION)
            .query(&[("page_size", "100")])
            .send()
            .await
            .map_err(|e| PlatformSyncError::Transient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(classify_status(resp.status(), "blocks.children.list failed"));
        }

        let body: Value = resp.json().await.map_err(|e| PlatformSyncError::Transient(e.to_string()))?;
        let results = body.get("results").and_then(Value::as_array).cloned().unwrap_or_default();

        let mut lines = Vec::with_capacity(results.len());
        for block in results {
            if let Some(text) = flatten_block_text(&block) {
                lines.push(text);
            }
        }
        Ok(lines.join("\n"))
    }
}

impl Default for NotionClient {
    fn default() -> Self {
        Self::new()
    }
}

fn extract_title(page: &Value) -> String {
    page.get("properties")
        .and_then(Value::as_object)
        .and_then(|props| props.values().find(|p| p.get("type").and_then(Value::as_str) == Some("title")))
        .and_then(|p| p.get("title"))
        .and_then(Value::as_array)
        .and_then(|parts| parts.first())
        .and_then(|part| part.get("plain_text"))
        .and_then(Value::as_str)
        .unwrap_or("untitled")
        .to_string()
}

/// Flattens one rich-text-bearing block type (paragraph, heading, list item)
/// to its plain text. Non-text blocks (images, dividers) are skipped.
fn flatten_block_text(block: &Value) -> Option<String> {
    let block_type = block.get("type")?.as_str()?;
    let payload = block.get(block_type)?;
    let rich_text = payload.get("rich_text")?.as_array()?;
    let text: String = rich_text.iter().filter_map(|rt| rt.get("plain_text")?.as_str()).collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl PlatformClient for NotionClient {
    fn platform(&self) -> Platform {
        Platform::Notion
    }

    async fn fetch_landscape(&self, access_token: &str) -> Result<Vec<Resource>> {
        let resp = self
            .http
            .post("https://api.notion.com/v1/search")
            .bearer_auth(access_token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&serde_json::json!({ "filter": { "property": "object", "value": "page" }, "page_size": 100 }))
            .send()
            .await
            .map_err(|e| PlatformSyncError::Transient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(classify_status(resp.status(), "search failed"));
        }

        let body: Value = resp.json().await.map_err(|e| PlatformSyncError::Transient(e.to_string()))?;
        let results = body.get("results").and_then(Value::as_array).cloned().unwrap_or_default();

        Ok(results
            .into_iter()
            .filter_map(|page| {
                let id = page.get("id")?.as_str()?.to_string();
                let name = extract_title(&page);
                Some(Resource { id, name, resource_type: "page".to_string(), metadata: Default::default() })
            })
            .collect())
    }

    async fn fetch_selected(
        &self,
        access_token: &str,
        selected_sources: &[String],
    ) -> Result<Vec<(String, Result<Vec<FetchedItem>>)>> {
        let mut results = Vec::with_capacity(selected_sources.len());
        for page_id in selected_sources {
            let outcome = self.fetch_page(access_token, page_id).await.map(|item| vec![item]);
            results.push((page_id.clone(), outcome));
        }
        Ok(results)
    }

    async fn send(&self, _access_token: &str, _target: &str, _content: &str) -> Result<()> {
        // Notion has no message-send primitive; outbound delivery goes
        // through the `notion` exporter (append-to-page), not this client.
        Err(PlatformSyncError::NoClient("notion does not support direct send".to_string()))
    }
}
