use serde::Deserialize;
use tracing::warn;

use yarnnn_core::completions::{ChatRequest, Completions, Message, Role};
use yarnnn_core::types::{DeliverableSource, UserId};

use crate::error::Result;
use crate::filter::filter_actions;
use crate::types::{ActivityLine, ContextLine, ExistingDeliverableRef, SignalAction, SignalProcessingResult, SignalSummary};

/// Below this many total items across all platforms, the sufficiency gate
/// fires and no reasoning call is made (§4.3 Step 1 "cold-start graceful exit").
const MIN_ITEMS_FOR_REASONING: usize = 3;

const REASONING_SYSTEM_PROMPT: &str = "You are the signal processing component of a productivity system.

You read live platform content (emails, calendar events, chat messages, document pages) and decide \
what is significant enough to warrant creating or triggering a deliverable.

Reason about content significance, not absence or thresholds. Prefer `trigger_existing` when an \
existing deliverable already covers the pattern. Use `create_signal_emergent` only for novel work no \
existing recurring deliverable handles. Default to `no_action` when content is sparse or routine.

Respond ONLY with JSON: {\"actions\": [...], \"reasoning\": \"...\"}. Each action is one of:
{\"action_type\": \"create_signal_emergent\", \"deliverable_type\": \"...\", \"title\": \"...\", \"description\": \"...\", \"confidence\": 0.0-1.0, \"sources\": [...], \"signal_context\": {...}}
{\"action_type\": \"trigger_existing\", \"deliverable_type\": \"...\", \"trigger_deliverable_id\": \"<uuid>\", \"confidence\": 0.0-1.0}
{\"action_type\": \"no_action\"}
Only suggest actions with confidence >= 0.60.";

/// §4.3 Step 1 (sufficiency gate) + Step 2 (reasoning pass) + Step 3
/// (filter/dedupe). Returns `no_action`-equivalent (empty actions) without
/// an LLM call when the summary has no signals or too few total items.
pub async fn process_signal(
    completions: &dyn Completions,
    model: &str,
    user_id: UserId,
    summary: &SignalSummary,
    user_context: &[ContextLine],
    recent_activity: &[ActivityLine],
    existing_deliverables: &[ExistingDeliverableRef],
) -> Result<SignalProcessingResult> {
    let now = yarnnn_core::types::now();

    if !summary.has_signals() {
        return Ok(SignalProcessingResult::empty(user_id, now));
    }
    if summary.total_items() < MIN_ITEMS_FOR_REASONING {
        return Ok(SignalProcessingResult {
            reasoning_summary: "Insufficient platform content for signal detection".to_string(),
            ..SignalProcessingResult::empty(user_id, now)
        });
    }

    let prompt = build_reasoning_prompt(summary, user_context, recent_activity, existing_deliverables);
    let request = ChatRequest {
        model: model.to_string(),
        system: REASONING_SYSTEM_PROMPT.to_string(),
        messages: vec![Message::text(Role::User, prompt)],
        tools: Vec::new(),
        max_tokens: 1000,
    };

    let response = match completions.chat(request).await {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "signal reasoning call failed");
            return Ok(SignalProcessingResult::empty(user_id, now));
        }
    };

    let (actions, reasoning) = parse_reasoning_response(&response.text);
    let filtered = filter_actions(actions, existing_deliverables);

    Ok(SignalProcessingResult { user_id, processed_at: now, actions: filtered, reasoning_summary: reasoning })
}

fn build_reasoning_prompt(
    summary: &SignalSummary,
    user_context: &[ContextLine],
    recent_activity: &[ActivityLine],
    existing_deliverables: &[ExistingDeliverableRef],
) -> String {
    let mut platform_sections = Vec::new();
    if let Some(d) = &summary.calendar_content {
        platform_sections.push(format!("CALENDAR ({} events):\n{}", d.items_count, d.content_summary));
    }
    if let Some(d) = &summary.gmail_content {
        platform_sections.push(format!("GMAIL ({} messages):\n{}", d.items_count, d.content_summary));
    }
    if let Some(d) = &summary.slack_content {
        platform_sections.push(format!("SLACK ({} messages):\n{}", d.items_count, d.content_summary));
    }
    if let Some(d) = &summary.notion_content {
        platform_sections.push(format!("NOTION ({} items):\n{}", d.items_count, d.content_summary));
    }
    let platform_content_text = if platform_sections.is_empty() {
        "PLATFORM CONTENT: no recent activity across connected platforms".to_string()
    } else {
        platform_sections.join("\n\n")
    };

    let context_text = if user_context.is_empty() {
        String::new()
    } else {
        let lines: Vec<String> = user_context.iter().take(15).map(|c| format!("- {}", c.value)).collect();
        format!("USER CONTEXT:\n{}", lines.join("\n"))
    };

    let activity_text = if recent_activity.is_empty() {
        String::new()
    } else {
        let lines: Vec<String> = recent_activity.iter().take(8).map(|a| format!("- {}", a.summary)).collect();
        format!("RECENT SYSTEM ACTIVITY:\n{}", lines.join("\n"))
    };

    let deliverables_text = if existing_deliverables.is_empty() {
        "EXISTING DELIVERABLES: none configured".to_string()
    } else {
        let lines: Vec<String> = existing_deliverables
            .iter()
            .take(10)
            .map(|d| {
                let preview = d.recent_content_preview.as_deref().unwrap_or("");
                format!("- [{}] {} ({}){}", d.id, d.title, d.deliverable_type, if preview.is_empty() { String::new() } else { format!("\n    last output: {preview}") })
            })
            .collect();
        format!("EXISTING DELIVERABLES:\n{}", lines.join("\n"))
    };

    format!(
        "{platform_content_text}\n\n{context_text}\n\n{activity_text}\n\n{deliverables_text}\n\n\
Given the above platform content, what is significant? What deliverable would add value right now?\n\n\
Respond with JSON only."
    )
}

#[derive(Deserialize)]
struct RawResponse {
    #[serde(default)]
    actions: Vec<RawAction>,
    #[serde(default)]
    reasoning: String,
}

#[derive(Deserialize)]
#[serde(tag = "action_type", rename_all = "snake_case")]
enum RawAction {
    CreateSignalEmergent {
        #[serde(default)]
        deliverable_type: String,
        #[serde(default)]
        title: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        confidence: f64,
        #[serde(default)]
        sources: Vec<DeliverableSource>,
        #[serde(default)]
        signal_context: serde_json::Map<String, serde_json::Value>,
    },
    TriggerExisting {
        #[serde(default)]
        deliverable_type: String,
        trigger_deliverable_id: Option<String>,
        #[serde(default)]
        confidence: f64,
    },
    NoAction,
}

/// Parses the model's JSON text, stripping a markdown code fence if present
/// (models reliably wrap JSON in ```json blocks despite instructions not to).
fn parse_reasoning_response(raw: &str) -> (Vec<SignalAction>, String) {
    let text = strip_code_fence(raw.trim());
    let parsed: RawResponse = match serde_json::from_str(text) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "failed to parse signal reasoning response");
            return (Vec::new(), String::new());
        }
    };

    let actions = parsed
        .actions
        .into_iter()
        .filter_map(|raw| match raw {
            RawAction::NoAction => None,
            RawAction::CreateSignalEmergent { deliverable_type, title, description, confidence, sources, signal_context } => {
                Some(SignalAction::CreateSignalEmergent { deliverable_type, title, description, confidence, sources, signal_context })
            }
            RawAction::TriggerExisting { deliverable_type, trigger_deliverable_id, confidence } => {
                let id = trigger_deliverable_id?.parse().ok()?;
                Some(SignalAction::TriggerExisting { deliverable_type, trigger_deliverable_id: id, confidence })
            }
        })
        .collect();

    (actions, parsed.reasoning)
}

fn strip_code_fence(text: &str) -> &str {
    if let Some(stripped) = text.strip_prefix("```") {
        let stripped = stripped.strip_prefix("json").unwrap_or(stripped);
        stripped.trim().strip_suffix("```").unwrap_or(stripped).trim()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_code_fence() {
        let raw = "```json\n{\"actions\": [], \"reasoning\": \"none\"}\n```";
        let (actions, reasoning) = parse_reasoning_response(raw);
        assert!(actions.is_empty());
        assert_eq!(reasoning, "none");
    }

    #[test]
    fn invalid_trigger_deliverable_id_drops_the_action() {
        let raw = r#"{"actions": [{"action_type": "trigger_existing", "deliverable_type": "x", "trigger_deliverable_id": "not-a-uuid", "confidence": 0.9}], "reasoning": "r"}"#;
        let (actions, _) = parse_reasoning_response(raw);
        assert!(actions.is_empty());
    }

    #[test]
    fn malformed_json_yields_no_actions() {
        let (actions, reasoning) = parse_reasoning_response("not json");
        assert!(actions.is_empty());
        assert!(reasoning.is_empty());
    }
}
