use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use yarnnn_activity::{ActivityStore, EventType};
use yarnnn_core::types::UserId;

use super::{Tool, ToolResult};
use crate::store::DeliverableStore;

/// Surfaces the same system-state figures as the working-memory block
/// (§4.5) — last signal pass, pending reviews, failed jobs in the trailing
/// 24h — so the agent can reference system health without guessing (§4.4
/// Step 4 tool set).
pub struct GetSystemStateTool {
    activity: Arc<ActivityStore>,
    store: Arc<DeliverableStore>,
    user_id: UserId,
}

impl GetSystemStateTool {
    pub fn new(activity: Arc<ActivityStore>, store: Arc<DeliverableStore>, user_id: UserId) -> Self {
        Self { activity, store, user_id }
    }
}

#[async_trait]
impl Tool for GetSystemStateTool {
    fn name(&self) -> &str {
        "get_system_state"
    }

    fn description(&self) -> &str {
        "Get a summary of the system's current health: last signal pass time, pending reviews, and recent failures"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _input: serde_json::Value) -> ToolResult {
        let last_signal_pass_at = match self.activity.last_event(Some(self.user_id.as_str()), EventType::SignalProcessed) {
            Ok(e) => e.map(|e| e.created_at.to_rfc3339()),
            Err(e) => return ToolResult::error(format!("failed to read activity log: {e}")),
        };
        let pending_reviews_count = match self.store.count_pending_review(self.user_id.as_str()) {
            Ok(n) => n,
            Err(e) => return ToolResult::error(format!("failed to count pending reviews: {e}")),
        };
        let failed_jobs_24h = match self.activity.failed_jobs_24h(self.user_id.as_str()) {
            Ok(n) => n,
            Err(e) => return ToolResult::error(format!("failed to count failed jobs: {e}")),
        };

        ToolResult::success(
            json!({
                "last_signal_pass_at": last_signal_pass_at,
                "pending_reviews_count": pending_reviews_count,
                "failed_jobs_24h": failed_jobs_24h,
            })
            .to_string(),
        )
    }
}
