//! The generation agent's mode-gated read-only tool set (§4.4 Step 4):
//! `Read`, `Search`, `List`, `WebSearch`, `GetSystemState` — deliberately no
//! `Write`/`Edit`/`Execute`, grounded on `skynet-agent::tools::Tool` but with
//! domain-specific bodies over the content cache, activity log, and an
//! external web-search collaborator.

pub mod get_system_state;
pub mod list;
pub mod read;
pub mod search;
pub mod web_search;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use yarnnn_core::completions::ToolDefinition;

pub use get_system_state::GetSystemStateTool;
pub use list::ListTool;
pub use read::ReadTool;
pub use search::SearchTool;
#[cfg(any(test, feature = "test-util"))]
pub use web_search::ScriptedWebSearch;
pub use web_search::{WebSearch, WebSearchError, WebSearchTool};

/// Result of executing a tool, threaded back to the model as a
/// `ContentBlock::ToolResult` (§4.4 Step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self { content: content.into(), is_error: false }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { content: message.into(), is_error: true }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> serde_json::Value;
    async fn execute(&self, input: serde_json::Value) -> ToolResult;
}

pub fn to_definitions(tools: &[Box<dyn Tool>]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|t| ToolDefinition {
            name: t.name().to_string(),
            description: t.description().to_string(),
            input_schema: t.input_schema(),
        })
        .collect()
}
