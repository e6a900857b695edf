use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use yarnnn_content_cache::{ContentCache, ContentFilters};
use yarnnn_core::types::{Platform, UserId};

use super::{Tool, ToolResult};

const MAX_ITEMS: usize = 30;

/// Reads the full cached content of one resource (§4.4 Step 4 tool set).
/// Read-only — there is no corresponding write tool in this loop.
pub struct ReadTool {
    cache: Arc<ContentCache>,
    user_id: UserId,
}

impl ReadTool {
    pub fn new(cache: Arc<ContentCache>, user_id: UserId) -> Self {
        Self { cache, user_id }
    }
}

#[derive(Deserialize)]
struct ReadInput {
    platform: String,
    resource_id: String,
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read the cached content of a specific platform resource by platform and resource id"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "platform": {"type": "string", "enum": ["slack", "gmail", "notion", "calendar"]},
                "resource_id": {"type": "string"},
            },
            "required": ["platform", "resource_id"],
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: ReadInput = match serde_json::from_value(input) {
            Ok(i) => i,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        let platform: Platform = match input.platform.parse() {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };

        let filters = ContentFilters {
            platform: Some(platform),
            resource_ids: Some(vec![input.resource_id.clone()]),
            ..Default::default()
        };
        let rows = match self.cache.query(self.user_id.as_str(), &filters, MAX_ITEMS) {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("read failed: {e}")),
        };

        if rows.is_empty() {
            return ToolResult::error(format!("no cached content for {}/{}", input.platform, input.resource_id));
        }

        let body = rows.into_iter().map(|r| r.item.content).collect::<Vec<_>>().join("\n\n");
        ToolResult::success(body)
    }
}
