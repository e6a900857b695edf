//! Tracks the last signal-pass time per user (§4.3) so `due_signal_users`
//! can apply a fixed minimum gap. Grounded on the same `DashMap` registry
//! idiom as `yarnnn_scheduler::AdvisoryLockRegistry` — in-memory, cleared on
//! restart, which just means every user's first post-restart tick runs a
//! signal pass immediately.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use yarnnn_core::types::UserId;

#[derive(Default)]
pub struct SignalPassTracker {
    last_run: DashMap<UserId, DateTime<Utc>>,
}

impl SignalPassTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_run(&self, user_id: &UserId) -> Option<DateTime<Utc>> {
        self.last_run.get(user_id).map(|entry| *entry)
    }

    pub fn record_run(&self, user_id: &UserId, at: DateTime<Utc>) {
        self.last_run.insert(user_id.clone(), at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_user_has_no_last_run() {
        let tracker = SignalPassTracker::new();
        assert!(tracker.last_run(&UserId::from("u1")).is_none());
    }

    #[test]
    fn records_and_reads_back_last_run() {
        let tracker = SignalPassTracker::new();
        let now = Utc::now();
        tracker.record_run(&UserId::from("u1"), now);
        assert_eq!(tracker.last_run(&UserId::from("u1")), Some(now));
    }
}
