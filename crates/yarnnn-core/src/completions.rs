//! The `Completions` port (§6) — the reasoning/generation LLM collaborator.
//!
//! Grounded on `skynet-agent::provider::LlmProvider`, narrowed to the single
//! contract the spec names: messages/system/tools/model/max_tokens in,
//! content_blocks/text/tool_uses/stop_reason out. Concrete providers are an
//! out-of-scope external collaborator — only the port and a test double live
//! here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// Raw content blocks (text, tool_use, tool_result) so the bounded tool
    /// loop can thread multi-block turns without a second message shape.
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: serde_json::Value },
    ToolResult { tool_use_id: String, content: String, is_error: bool },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
}

#[derive(Debug, Clone)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Response from a `chat` call (§6): tool uses are echoed as content blocks;
/// the caller threads tool results back as user turns.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content_blocks: Vec<ContentBlock>,
    pub text: String,
    pub tool_uses: Vec<ToolUse>,
    pub stop_reason: StopReason,
}

#[derive(Debug, Error)]
pub enum CompletionsError {
    #[error("transient provider failure: {0}")]
    Transient(String),
    #[error("terminal provider failure: {0}")]
    Terminal(String),
    #[error("response failed to parse as the expected JSON schema: {0}")]
    MalformedJson(String),
}

impl CompletionsError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CompletionsError::Transient(_))
    }
}

#[async_trait]
pub trait Completions: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, CompletionsError>;
}

/// In-memory double for tests — grounded on the teacher's pattern of
/// substituting fakes for `LlmProvider` rather than hitting real providers.
#[cfg(any(test, feature = "test-util"))]
pub struct ScriptedCompletions {
    responses: std::sync::Mutex<std::collections::VecDeque<ChatResponse>>,
}

#[cfg(any(test, feature = "test-util"))]
impl ScriptedCompletions {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into_iter().collect()),
        }
    }

    pub fn text_only(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(vec![ChatResponse {
            content_blocks: vec![ContentBlock::Text { text: text.clone() }],
            text,
            tool_uses: vec![],
            stop_reason: StopReason::EndTurn,
        }])
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl Completions for ScriptedCompletions {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, CompletionsError> {
        self.responses
            .lock()
            .expect("scripted completions mutex poisoned")
            .pop_front()
            .ok_or_else(|| CompletionsError::Terminal("scripted responses exhausted".into()))
    }
}
