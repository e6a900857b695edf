//! The headless generation agent's bounded tool loop (§4.4 Step 4), grounded
//! directly on `skynet-agent::tools::tool_loop::run_tool_loop`: same
//! `for round in 0..MAX` / "no tool calls or stop_reason != tool_use => done"
//! shape, generalized to a provider-supplied round bound and the closed
//! read-only tool set built in `tools/`.

use tracing::{debug, info, warn};

use yarnnn_core::completions::{ChatRequest, ChatResponse, Completions, ContentBlock, Message, Role, StopReason};

use crate::error::{DeliverableError, Result};
use crate::tools::{to_definitions, Tool};

/// Runs the bounded agentic loop and returns the final draft text. Returns
/// `DeliverableError::EmptyDraft` if the loop exits without producing any
/// text (§4.4 Step 4 "If the loop exits with empty text, the generation
/// fails").
pub async fn run_generation_loop(
    completions: &dyn Completions,
    model: &str,
    system_prompt: &str,
    user_prompt: &str,
    tools: &[Box<dyn Tool>],
    max_tool_rounds: usize,
) -> Result<String> {
    let tool_definitions = to_definitions(tools);
    let mut messages = vec![Message::text(Role::User, user_prompt)];
    let mut last_text = String::new();

    for round in 0..max_tool_rounds {
        debug!(round, "generation tool loop round");

        let request = ChatRequest {
            model: model.to_string(),
            system: system_prompt.to_string(),
            messages: messages.clone(),
            tools: tool_definitions.clone(),
            max_tokens: 4096,
        };

        let response = completions.chat(request).await?;
        last_text = response.text.clone();

        if response.tool_uses.is_empty() || response.stop_reason != StopReason::ToolUse {
            info!(round, "generation loop complete — no further tool calls");
            return finalize(last_text);
        }

        append_assistant_turn(&mut messages, &response);

        let mut tool_result_blocks = Vec::new();
        for tool_use in &response.tool_uses {
            let result = execute_tool(tools, &tool_use.name, tool_use.input.clone()).await;
            tool_result_blocks.push(ContentBlock::ToolResult {
                tool_use_id: tool_use.id.clone(),
                content: result.content,
                is_error: result.is_error,
            });
        }
        messages.push(Message { role: Role::User, content: tool_result_blocks });
    }

    warn!(max_tool_rounds, "generation loop hit its round bound");
    finalize(last_text)
}

fn finalize(text: String) -> Result<String> {
    if text.trim().is_empty() {
        Err(DeliverableError::EmptyDraft)
    } else {
        Ok(text)
    }
}

fn append_assistant_turn(messages: &mut Vec<Message>, response: &ChatResponse) {
    let mut content = Vec::new();
    if !response.text.is_empty() {
        content.push(ContentBlock::Text { text: response.text.clone() });
    }
    for tool_use in &response.tool_uses {
        content.push(ContentBlock::ToolUse {
            id: tool_use.id.clone(),
            name: tool_use.name.clone(),
            input: tool_use.input.clone(),
        });
    }
    messages.push(Message { role: Role::Assistant, content });
}

async fn execute_tool(tools: &[Box<dyn Tool>], name: &str, input: serde_json::Value) -> crate::tools::ToolResult {
    match tools.iter().find(|t| t.name() == name) {
        Some(tool) => {
            debug!(tool = name, "executing generation tool");
            tool.execute(input).await
        }
        None => crate::tools::ToolResult::error(format!("unknown tool: {name}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yarnnn_core::completions::{ScriptedCompletions, ToolUse};

    #[tokio::test]
    async fn returns_text_when_model_ends_turn_immediately() {
        let completions = ScriptedCompletions::text_only("a finished draft");
        let result = run_generation_loop(&completions, "gen-model", "system", "user prompt", &[], 3).await.unwrap();
        assert_eq!(result, "a finished draft");
    }

    #[tokio::test]
    async fn empty_final_text_is_an_error() {
        let completions = ScriptedCompletions::text_only("   ");
        let err = run_generation_loop(&completions, "gen-model", "system", "user prompt", &[], 3).await.unwrap_err();
        assert!(matches!(err, DeliverableError::EmptyDraft));
    }

    #[tokio::test]
    async fn exhausting_the_round_bound_without_end_turn_still_returns_last_text() {
        let responses = vec![
            ChatResponse {
                content_blocks: vec![],
                text: "intermediate".into(),
                tool_uses: vec![ToolUse { id: "t1".into(), name: "list".into(), input: serde_json::json!({}) }],
                stop_reason: StopReason::ToolUse,
            },
            ChatResponse {
                content_blocks: vec![],
                text: "still going".into(),
                tool_uses: vec![ToolUse { id: "t2".into(), name: "list".into(), input: serde_json::json!({}) }],
                stop_reason: StopReason::ToolUse,
            },
        ];
        let completions = ScriptedCompletions::new(responses);
        let result = run_generation_loop(&completions, "gen-model", "system", "user prompt", &[], 2).await.unwrap();
        assert_eq!(result, "still going");
    }
}
