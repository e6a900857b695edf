use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use yarnnn_content_cache::{ContentCache, ContentFilters};
use yarnnn_core::types::{Platform, UserId};

use super::{Tool, ToolResult};

/// Lists the distinct resources with cached content, one line per
/// `(platform, resource_id)` with an item count — lets the agent decide what
/// to `read` before it commits to a full fetch (§4.4 Step 4 tool set).
pub struct ListTool {
    cache: Arc<ContentCache>,
    user_id: UserId,
}

impl ListTool {
    pub fn new(cache: Arc<ContentCache>, user_id: UserId) -> Self {
        Self { cache, user_id }
    }
}

#[derive(Deserialize)]
struct ListInput {
    #[serde(default)]
    platform: Option<String>,
}

#[async_trait]
impl Tool for ListTool {
    fn name(&self) -> &str {
        "list"
    }

    fn description(&self) -> &str {
        "List the platform resources (channels, threads, pages, calendars) with cached content available to read"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "platform": {"type": "string", "enum": ["slack", "gmail", "notion", "calendar"]},
            },
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: ListInput = match serde_json::from_value(input) {
            Ok(i) => i,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        let platform = match input.platform.as_deref().map(|p| p.parse::<Platform>()) {
            Some(Ok(p)) => Some(p),
            Some(Err(e)) => return ToolResult::error(e),
            None => None,
        };

        let filters = ContentFilters { platform, ..Default::default() };
        let rows = match self.cache.query(self.user_id.as_str(), &filters, 500) {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("list failed: {e}")),
        };

        let mut counts: BTreeMap<(&'static str, String), usize> = BTreeMap::new();
        for row in &rows {
            *counts.entry((row.item.platform.as_str(), row.item.resource_id.clone())).or_insert(0) += 1;
        }

        if counts.is_empty() {
            return ToolResult::success("no cached resources");
        }

        let lines: Vec<String> = counts
            .into_iter()
            .map(|((platform, resource_id), count)| format!("[{platform}] {resource_id} ({count} items)"))
            .collect();
        ToolResult::success(lines.join("\n"))
    }
}
