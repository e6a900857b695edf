use chrono::{DateTime, Utc};
use tracing::{info, warn};

use yarnnn_core::types::{DeliverableId, Platform, UserId};

use crate::locks::AdvisoryLockRegistry;
use crate::types::{
    DeliverableWorkItem, DispatchPlan, DropReason, DroppedWork, LockKey, Queue, QueueCeilings,
    SignalWorkItem, SyncWorkItem,
};

/// Enumerates the work a dispatcher tick could run. Implemented by the
/// orchestrator binary against the content-cache / deliverables stores so
/// this crate stays decoupled from their schemas — the same separation the
/// teacher draws between `SchedulerEngine` (owns only the `jobs` table) and
/// the delivery router it forwards fired jobs to.
pub trait DueWorkSource {
    /// `(user_id, platform, resource_id)` tuples whose tier cadence or
    /// staleness threshold has elapsed (§4.2).
    fn due_syncs(&self, now: DateTime<Utc>) -> Vec<(UserId, Platform, String)>;
    /// Users whose signal pass cadence is due.
    fn due_signal_users(&self, now: DateTime<Utc>) -> Vec<UserId>;
    /// Deliverables whose `next_run_at` has arrived.
    fn due_deliverables(&self, now: DateTime<Utc>) -> Vec<DeliverableId>;
}

/// The 5-minute dispatcher tick (§5): enumerates due work across the three
/// queues, admits it past advisory locks and backpressure ceilings, and
/// returns the admitted + dropped sets for the caller to execute and log.
pub struct SchedulerEngine {
    locks: AdvisoryLockRegistry,
    ceilings: QueueCeilings,
}

impl SchedulerEngine {
    pub fn new(ceilings: QueueCeilings) -> Self {
        Self { locks: AdvisoryLockRegistry::new(), ceilings }
    }

    pub fn locks(&self) -> &AdvisoryLockRegistry {
        &self.locks
    }

    /// Build the admitted work plan for this tick. Lock guards are dropped
    /// immediately here — callers re-acquire the same key for the duration
    /// of actual execution via `self.locks()`, since the plan is built
    /// synchronously but execution is async.
    pub fn tick(&self, now: DateTime<Utc>, source: &dyn DueWorkSource) -> DispatchPlan {
        let mut plan = DispatchPlan::default();

        for (user_id, platform, resource_id) in source.due_syncs(now) {
            let key = LockKey::Sync(user_id.clone(), platform);
            if self.locks.is_held(&key) {
                plan.dropped.push(DroppedWork {
                    queue: Queue::Sync,
                    reason: DropReason::LockHeld,
                    detail: format!("{user_id}/{platform}"),
                });
                continue;
            }
            if plan.sync.len() >= self.ceilings.sync {
                plan.dropped.push(DroppedWork {
                    queue: Queue::Sync,
                    reason: DropReason::QueueCeiling,
                    detail: format!("{user_id}/{platform}/{resource_id}"),
                });
                continue;
            }
            plan.sync.push(SyncWorkItem { user_id, platform, resource_id });
        }

        for user_id in source.due_signal_users(now) {
            let key = LockKey::Signal(user_id.clone());
            if self.locks.is_held(&key) {
                plan.dropped.push(DroppedWork {
                    queue: Queue::Signal,
                    reason: DropReason::LockHeld,
                    detail: user_id.to_string(),
                });
                continue;
            }
            if plan.signal.len() >= self.ceilings.signal {
                plan.dropped.push(DroppedWork {
                    queue: Queue::Signal,
                    reason: DropReason::QueueCeiling,
                    detail: user_id.to_string(),
                });
                continue;
            }
            plan.signal.push(SignalWorkItem { user_id });
        }

        for deliverable_id in source.due_deliverables(now) {
            let key = LockKey::Deliverable(deliverable_id.clone());
            if self.locks.is_held(&key) {
                plan.dropped.push(DroppedWork {
                    queue: Queue::Deliverable,
                    reason: DropReason::LockHeld,
                    detail: deliverable_id.to_string(),
                });
                continue;
            }
            if plan.deliverable.len() >= self.ceilings.deliverable {
                plan.dropped.push(DroppedWork {
                    queue: Queue::Deliverable,
                    reason: DropReason::QueueCeiling,
                    detail: deliverable_id.to_string(),
                });
                continue;
            }
            plan.deliverable.push(DeliverableWorkItem { deliverable_id });
        }

        if plan.dropped.is_empty() {
            info!(
                sync = plan.sync.len(),
                signal = plan.signal.len(),
                deliverable = plan.deliverable.len(),
                "scheduler tick dispatched"
            );
        } else {
            warn!(
                sync = plan.sync.len(),
                signal = plan.signal.len(),
                deliverable = plan.deliverable.len(),
                dropped = plan.dropped.len(),
                "scheduler tick dispatched with drops"
            );
        }

        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource {
        syncs: Vec<(UserId, Platform, String)>,
        signals: Vec<UserId>,
        deliverables: Vec<DeliverableId>,
    }

    impl DueWorkSource for FixedSource {
        fn due_syncs(&self, _now: DateTime<Utc>) -> Vec<(UserId, Platform, String)> {
            self.syncs.clone()
        }
        fn due_signal_users(&self, _now: DateTime<Utc>) -> Vec<UserId> {
            self.signals.clone()
        }
        fn due_deliverables(&self, _now: DateTime<Utc>) -> Vec<DeliverableId> {
            self.deliverables.clone()
        }
    }

    #[test]
    fn admits_all_work_when_nothing_contends() {
        let engine = SchedulerEngine::new(QueueCeilings::default());
        let source = FixedSource {
            syncs: vec![(UserId::from("u1"), Platform::Slack, "C1".into())],
            signals: vec![UserId::from("u1")],
            deliverables: vec![DeliverableId::new()],
        };
        let plan = engine.tick(Utc::now(), &source);
        assert_eq!(plan.sync.len(), 1);
        assert_eq!(plan.signal.len(), 1);
        assert_eq!(plan.deliverable.len(), 1);
        assert!(plan.dropped.is_empty());
    }

    #[test]
    fn drops_work_whose_lock_is_already_held() {
        let engine = SchedulerEngine::new(QueueCeilings::default());
        let user = UserId::from("u1");
        let _guard = engine.locks().try_acquire(LockKey::Sync(user.clone(), Platform::Slack)).unwrap();

        let source = FixedSource {
            syncs: vec![(user, Platform::Slack, "C1".into())],
            signals: vec![],
            deliverables: vec![],
        };
        let plan = engine.tick(Utc::now(), &source);
        assert!(plan.sync.is_empty());
        assert_eq!(plan.dropped.len(), 1);
        assert_eq!(plan.dropped[0].reason, DropReason::LockHeld);
    }

    #[test]
    fn respects_queue_ceiling() {
        let engine = SchedulerEngine::new(QueueCeilings { sync: 1, signal: 64, deliverable: 32 });
        let source = FixedSource {
            syncs: vec![
                (UserId::from("u1"), Platform::Slack, "C1".into()),
                (UserId::from("u2"), Platform::Slack, "C2".into()),
            ],
            signals: vec![],
            deliverables: vec![],
        };
        let plan = engine.tick(Utc::now(), &source);
        assert_eq!(plan.sync.len(), 1);
        assert_eq!(plan.dropped.len(), 1);
        assert_eq!(plan.dropped[0].reason, DropReason::QueueCeiling);
    }
}
