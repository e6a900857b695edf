use std::collections::HashSet;

use crate::types::{ExistingDeliverableRef, SignalAction, CONFIDENCE_THRESHOLD};

/// §4.3 Step 3: confidence threshold, skip-if-type-already-configured, and
/// one-action-per-type-per-pass. `SignalHistory` dedup (signal_ref-scoped)
/// happens later, at execution time, since it needs a store lookup the
/// pure filter shouldn't own.
pub fn filter_actions(actions: Vec<SignalAction>, existing_deliverables: &[ExistingDeliverableRef]) -> Vec<SignalAction> {
    let existing_types: HashSet<&str> = existing_deliverables.iter().map(|d| d.deliverable_type.as_str()).collect();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut filtered = Vec::new();

    for action in actions {
        if action.confidence() < CONFIDENCE_THRESHOLD {
            continue;
        }

        if let SignalAction::CreateSignalEmergent { deliverable_type, .. } = &action {
            if existing_types.contains(deliverable_type.as_str()) {
                continue;
            }
        }

        let Some(deliverable_type) = action.deliverable_type() else { continue };
        let kind = match &action {
            SignalAction::CreateSignalEmergent { .. } => "create_signal_emergent",
            SignalAction::TriggerExisting { .. } => "trigger_existing",
            SignalAction::NoAction => continue,
        };
        let key = (kind.to_string(), deliverable_type.to_string());
        if !seen.insert(key) {
            continue;
        }

        filtered.push(action);
    }

    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use yarnnn_core::types::DeliverableId;

    fn create(deliverable_type: &str, confidence: f64) -> SignalAction {
        SignalAction::CreateSignalEmergent {
            deliverable_type: deliverable_type.to_string(),
            title: "t".to_string(),
            description: "d".to_string(),
            confidence,
            sources: Vec::new(),
            signal_context: Default::default(),
        }
    }

    #[test]
    fn drops_actions_below_confidence_threshold() {
        let filtered = filter_actions(vec![create("research_brief", 0.4)], &[]);
        assert!(filtered.is_empty());
    }

    #[test]
    fn drops_create_when_type_already_configured() {
        let existing = vec![ExistingDeliverableRef {
            id: DeliverableId::new(),
            deliverable_type: "research_brief".to_string(),
            title: "t".to_string(),
            next_run_at: None,
            recent_content_preview: None,
        }];
        let filtered = filter_actions(vec![create("research_brief", 0.9)], &existing);
        assert!(filtered.is_empty());
    }

    #[test]
    fn keeps_only_one_action_per_type_per_pass() {
        let filtered = filter_actions(vec![create("research_brief", 0.9), create("research_brief", 0.95)], &[]);
        assert_eq!(filtered.len(), 1);
    }
}
