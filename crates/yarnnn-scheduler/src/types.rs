use yarnnn_core::types::{DeliverableId, Platform, UserId};

/// The three serialization scopes named in §5: per-`(user_id, platform)`
/// sync, per-`user_id` signal pass, per-`deliverable_id` generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockKey {
    Sync(UserId, Platform),
    Signal(UserId),
    Deliverable(DeliverableId),
}

/// The three logical work queues a dispatcher tick fans work into (§5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Queue {
    Sync,
    Signal,
    Deliverable,
}

/// One unit of work produced by a tick for the `sync` queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncWorkItem {
    pub user_id: UserId,
    pub platform: Platform,
    pub resource_id: String,
}

/// One unit of work produced by a tick for the `signal` queue — a whole
/// user's signal pass runs over every platform at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalWorkItem {
    pub user_id: UserId,
}

/// One unit of work produced by a tick for the `deliverable` queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverableWorkItem {
    pub deliverable_id: DeliverableId,
}

/// The result of a single dispatcher tick: work admitted into each queue
/// after lock acquisition and backpressure, plus what was dropped (surfaced
/// as a `scheduler_dropped` activity entry by the caller).
#[derive(Debug, Clone, Default)]
pub struct DispatchPlan {
    pub sync: Vec<SyncWorkItem>,
    pub signal: Vec<SignalWorkItem>,
    pub deliverable: Vec<DeliverableWorkItem>,
    pub dropped: Vec<DroppedWork>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedWork {
    pub queue: Queue,
    pub reason: DropReason,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Another unit of work for the same lock scope is already in flight.
    LockHeld,
    /// The queue's configured depth ceiling was reached (§5 backpressure).
    QueueCeiling,
}

/// Per-queue depth ceilings a tick will not exceed (§5 "Backpressure").
#[derive(Debug, Clone, Copy)]
pub struct QueueCeilings {
    pub sync: usize,
    pub signal: usize,
    pub deliverable: usize,
}

impl Default for QueueCeilings {
    fn default() -> Self {
        Self { sync: 64, signal: 64, deliverable: 32 }
    }
}
