//! Concrete `Completions` port (§6): a non-streaming Anthropic Messages API
//! client, grounded on `skynet-agent::anthropic::AnthropicProvider` — this
//! binary never needs the teacher's streaming/thinking/provider-fallback
//! machinery, so only the single request/response round trip is kept.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use yarnnn_core::completions::{ChatRequest, ChatResponse, CompletionsError, ContentBlock, Role, StopReason};

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicCompletions {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicCompletions {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self { client: reqwest::Client::new(), api_key, base_url }
    }
}

#[async_trait]
impl yarnnn_core::completions::Completions for AnthropicCompletions {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, CompletionsError> {
        let body = build_request_body(&request);
        let url = format!("{}/v1/messages", self.base_url);

        debug!(model = %request.model, "sending request to Anthropic");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionsError::Transient(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 || status.is_server_error() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CompletionsError::Transient(format!("{status}: {text}")));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(%status, body = %text, "Anthropic API error");
            return Err(CompletionsError::Terminal(format!("{status}: {text}")));
        }

        let api_resp: ApiResponse =
            resp.json().await.map_err(|e| CompletionsError::MalformedJson(e.to_string()))?;

        Ok(parse_response(api_resp))
    }
}

fn build_request_body(req: &ChatRequest) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = req
        .messages
        .iter()
        .map(|m| {
            json!({
                "role": match m.role { Role::User => "user", Role::Assistant => "assistant" },
                "content": m.content.iter().map(content_block_to_json).collect::<Vec<_>>(),
            })
        })
        .collect();

    let mut body = json!({
        "model": req.model,
        "system": req.system,
        "messages": messages,
        "max_tokens": req.max_tokens,
    });

    if !req.tools.is_empty() {
        let tools: Vec<serde_json::Value> = req
            .tools
            .iter()
            .map(|t| json!({"name": t.name, "description": t.description, "input_schema": t.input_schema}))
            .collect();
        body["tools"] = json!(tools);
    }

    body
}

fn content_block_to_json(block: &ContentBlock) -> serde_json::Value {
    match block {
        ContentBlock::Text { text } => json!({"type": "text", "text": text}),
        ContentBlock::ToolUse { id, name, input } => json!({"type": "tool_use", "id": id, "name": name, "input": input}),
        ContentBlock::ToolResult { tool_use_id, content, is_error } => {
            json!({"type": "tool_result", "tool_use_id": tool_use_id, "content": content, "is_error": is_error})
        }
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    content: Vec<ApiContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: serde_json::Value },
}

fn parse_response(api_resp: ApiResponse) -> ChatResponse {
    let mut content_blocks = Vec::new();
    let mut text = String::new();
    let mut tool_uses = Vec::new();

    for block in api_resp.content {
        match block {
            ApiContentBlock::Text { text: t } => {
                text.push_str(&t);
                content_blocks.push(ContentBlock::Text { text: t });
            }
            ApiContentBlock::ToolUse { id, name, input } => {
                tool_uses.push(yarnnn_core::completions::ToolUse { id: id.clone(), name: name.clone(), input: input.clone() });
                content_blocks.push(ContentBlock::ToolUse { id, name, input });
            }
        }
    }

    let stop_reason = match api_resp.stop_reason.as_deref() {
        Some("tool_use") => StopReason::ToolUse,
        Some("max_tokens") => StopReason::MaxTokens,
        _ => StopReason::EndTurn,
    };

    ChatResponse { content_blocks, text, tool_uses, stop_reason }
}
