//! The 5-minute dispatcher tick (§5): enumerates due sync/signal/deliverable
//! work, serializes it with advisory locks keyed by `(user_id, platform)` /
//! `(user_id,)` / `(deliverable_id,)`, and applies per-queue backpressure
//! ceilings.

pub mod engine;
pub mod error;
pub mod locks;
pub mod schedule;
pub mod types;

pub use engine::{DueWorkSource, SchedulerEngine};
pub use error::{Result, SchedulerError};
pub use locks::{AdvisoryLockRegistry, LockGuard};
pub use schedule::compute_next_run;
pub use types::{
    DeliverableWorkItem, DispatchPlan, DropReason, DroppedWork, LockKey, Queue, QueueCeilings,
    SignalWorkItem, SyncWorkItem,
};
