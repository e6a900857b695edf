use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use super::{Tool, ToolResult};

/// One organic result (§4.4 Step 2 "research directive" + Step 4 tool set).
#[derive(Debug, Clone)]
pub struct WebSearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Error)]
pub enum WebSearchError {
    #[error("transient web search failure: {0}")]
    Transient(String),
    #[error("terminal web search failure: {0}")]
    Terminal(String),
}

/// External web-search collaborator (§4.4's `research`/`hybrid` strategies
/// and the generation tool set). Only the port and a test double live here —
/// the concrete provider is out-of-scope, mirroring `Completions`.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<WebSearchResult>, WebSearchError>;
}

/// In-memory double for tests, grounded on `ScriptedCompletions`.
#[cfg(any(test, feature = "test-util"))]
pub struct ScriptedWebSearch {
    results: std::sync::Mutex<std::collections::VecDeque<Vec<WebSearchResult>>>,
}

#[cfg(any(test, feature = "test-util"))]
impl ScriptedWebSearch {
    pub fn new(results: Vec<Vec<WebSearchResult>>) -> Self {
        Self { results: std::sync::Mutex::new(results.into_iter().collect()) }
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl WebSearch for ScriptedWebSearch {
    async fn search(&self, _query: &str) -> Result<Vec<WebSearchResult>, WebSearchError> {
        self.results
            .lock()
            .expect("scripted web search mutex poisoned")
            .pop_front()
            .ok_or_else(|| WebSearchError::Terminal("scripted results exhausted".into()))
    }
}

const MAX_RESULTS: usize = 5;

pub struct WebSearchTool {
    search: std::sync::Arc<dyn WebSearch>,
}

impl WebSearchTool {
    pub fn new(search: std::sync::Arc<dyn WebSearch>) -> Self {
        Self { search }
    }
}

#[derive(Deserialize)]
struct WebSearchInput {
    query: String,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the public web for information not available in cached platform content"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {"query": {"type": "string"}},
            "required": ["query"],
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: WebSearchInput = match serde_json::from_value(input) {
            Ok(i) => i,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        match self.search.search(&input.query).await {
            Ok(results) => {
                if results.is_empty() {
                    return ToolResult::success("no results");
                }
                let lines: Vec<String> = results
                    .into_iter()
                    .take(MAX_RESULTS)
                    .map(|r| format!("{} — {}\n{}", r.title, r.url, r.snippet))
                    .collect();
                ToolResult::success(lines.join("\n---\n"))
            }
            Err(e) => {
                warn!(error = %e, "web search failed");
                ToolResult::error(e.to_string())
            }
        }
    }
}
