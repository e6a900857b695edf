use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use yarnnn_content_cache::{ContentCache, ContentFilters};
use yarnnn_core::types::{Platform, UserId};

use super::{Tool, ToolResult};

const MAX_RESULTS: usize = 20;
const SNIPPET_CHARS: usize = 240;

/// Case-insensitive substring search over the user's cached content (§4.4
/// Step 4 tool set). Deliberately naive — no full-text index in this store,
/// matching `ContentCache`'s own query surface.
pub struct SearchTool {
    cache: Arc<ContentCache>,
    user_id: UserId,
}

impl SearchTool {
    pub fn new(cache: Arc<ContentCache>, user_id: UserId) -> Self {
        Self { cache, user_id }
    }
}

#[derive(Deserialize)]
struct SearchInput {
    query: String,
    #[serde(default)]
    platform: Option<String>,
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search cached platform content for a keyword or phrase, optionally scoped to one platform"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "platform": {"type": "string", "enum": ["slack", "gmail", "notion", "calendar"]},
            },
            "required": ["query"],
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: SearchInput = match serde_json::from_value(input) {
            Ok(i) => i,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        let platform = match input.platform.as_deref().map(|p| p.parse::<Platform>()) {
            Some(Ok(p)) => Some(p),
            Some(Err(e)) => return ToolResult::error(e),
            None => None,
        };

        let filters = ContentFilters { platform, ..Default::default() };
        let rows = match self.cache.query(self.user_id.as_str(), &filters, 200) {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("search failed: {e}")),
        };

        let needle = input.query.to_lowercase();
        let matches: Vec<_> = rows
            .into_iter()
            .filter(|r| r.item.content.to_lowercase().contains(&needle))
            .take(MAX_RESULTS)
            .map(|r| {
                let snippet: String = r.item.content.chars().take(SNIPPET_CHARS).collect();
                format!("[{}] {} — {snippet}", r.item.platform.as_str(), r.item.resource_id)
            })
            .collect();

        if matches.is_empty() {
            ToolResult::success("no matches")
        } else {
            ToolResult::success(matches.join("\n---\n"))
        }
    }
}
