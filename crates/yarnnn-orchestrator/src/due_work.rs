//! Concrete `DueWorkSource` (§5): enumerates due work against the stores
//! this binary owns, so `yarnnn-scheduler` itself never learns their schema.
//!
//! `sync_platform` (§4.2) syncs a connection's whole selected-source set in
//! one call, so a due sync is reported at connection granularity — the
//! `resource_id` slot `DueWorkSource` asks for is filled with `"*"` to mean
//! "every source this connection has selected", not a single resource.

use chrono::{DateTime, Utc};
use tracing::warn;

use yarnnn_core::types::{DeliverableId, Platform, UserId};
use yarnnn_deliverables::DeliverableStore;
use yarnnn_platform_sync::{should_sync_now, Cadence};
use yarnnn_scheduler::DueWorkSource;

use crate::connections::ConnectionStore;

/// Minimum spacing between signal passes for the same user, independent of
/// sync cadence — a signal pass is cheap relative to a platform sync, so a
/// single fixed interval (rather than a tiered one) is enough (§4.3).
const SIGNAL_PASS_MIN_GAP_MINUTES: i64 = 30;

pub struct OrchestratorDueWorkSource {
    connections: std::sync::Arc<ConnectionStore>,
    deliverables: std::sync::Arc<DeliverableStore>,
    signal_passes: std::sync::Arc<crate::signal_state::SignalPassTracker>,
}

impl OrchestratorDueWorkSource {
    pub fn new(
        connections: std::sync::Arc<ConnectionStore>,
        deliverables: std::sync::Arc<DeliverableStore>,
        signal_passes: std::sync::Arc<crate::signal_state::SignalPassTracker>,
    ) -> Self {
        Self { connections, deliverables, signal_passes }
    }
}

impl DueWorkSource for OrchestratorDueWorkSource {
    fn due_syncs(&self, now: DateTime<Utc>) -> Vec<(UserId, Platform, String)> {
        let connected = match self.connections.list_connected() {
            Ok(rows) => rows,
            Err(err) => {
                warn!(error = %err, "failed to list connections for sync scheduling");
                return Vec::new();
            }
        };

        connected
            .into_iter()
            .filter(|(connection, tier)| {
                should_sync_now(Cadence::for_tier(*tier), now, connection.last_synced_at)
            })
            .map(|(connection, _tier)| (connection.user_id, connection.platform, "*".to_string()))
            .collect()
    }

    fn due_signal_users(&self, now: DateTime<Utc>) -> Vec<UserId> {
        let users = match self.connections.list_users_with_connections() {
            Ok(users) => users,
            Err(err) => {
                warn!(error = %err, "failed to list users for signal scheduling");
                return Vec::new();
            }
        };

        users
            .into_iter()
            .filter(|user_id| {
                let gap = chrono::Duration::minutes(SIGNAL_PASS_MIN_GAP_MINUTES);
                self.signal_passes.last_run(user_id).map(|last| now - last >= gap).unwrap_or(true)
            })
            .collect()
    }

    fn due_deliverables(&self, now: DateTime<Utc>) -> Vec<DeliverableId> {
        match self.deliverables.list_due(now) {
            Ok(deliverables) => deliverables.into_iter().map(|d| d.id).collect(),
            Err(err) => {
                warn!(error = %err, "failed to list due deliverables");
                Vec::new()
            }
        }
    }
}
