use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::types::LockKey;

/// How long an advisory lock is honored before it is considered stale and
/// silently reclaimed — survives a crashed worker without a janitor pass
/// (§5 "lock expiry to survive crashes").
const LOCK_TTL: Duration = Duration::from_secs(15 * 60);

/// In-memory advisory locks keyed by the three serialization scopes in §5,
/// grounded on the teacher's `DashMap`-based `AppState.active_operations`
/// registry (`skynet-gateway::app::AppState`).
#[derive(Default)]
pub struct AdvisoryLockRegistry {
    held: DashMap<LockKey, Instant>,
}

/// RAII guard: dropping it releases the lock. Held across the lifetime of
/// the in-flight sync / signal pass / generation it protects.
pub struct LockGuard<'a> {
    registry: &'a AdvisoryLockRegistry,
    key: LockKey,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.registry.held.remove(&self.key);
    }
}

impl AdvisoryLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to acquire `key`. Returns `None` if another operation already
    /// holds it and its lease has not expired.
    pub fn try_acquire(&self, key: LockKey) -> Option<LockGuard<'_>> {
        let now = Instant::now();
        let mut acquired = false;
        self.held
            .entry(key.clone())
            .and_modify(|held_at| {
                if now.duration_since(*held_at) >= LOCK_TTL {
                    *held_at = now;
                    acquired = true;
                }
            })
            .or_insert_with(|| {
                acquired = true;
                now
            });

        if acquired {
            Some(LockGuard { registry: self, key })
        } else {
            None
        }
    }

    pub fn is_held(&self, key: &LockKey) -> bool {
        self.held
            .get(key)
            .map(|held_at| Instant::now().duration_since(*held_at) < LOCK_TTL)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yarnnn_core::types::UserId;

    #[test]
    fn second_acquire_fails_while_first_guard_lives() {
        let registry = AdvisoryLockRegistry::new();
        let key = LockKey::Signal(UserId::from("u1"));
        let _guard = registry.try_acquire(key.clone()).expect("first acquire succeeds");
        assert!(registry.try_acquire(key).is_none());
    }

    #[test]
    fn lock_is_released_on_drop() {
        let registry = AdvisoryLockRegistry::new();
        let key = LockKey::Signal(UserId::from("u1"));
        {
            let _guard = registry.try_acquire(key.clone()).unwrap();
        }
        assert!(registry.try_acquire(key).is_some());
    }

    #[test]
    fn distinct_keys_do_not_contend() {
        let registry = AdvisoryLockRegistry::new();
        let a = registry.try_acquire(LockKey::Signal(UserId::from("u1")));
        let b = registry.try_acquire(LockKey::Signal(UserId::from("u2")));
        assert!(a.is_some());
        assert!(b.is_some());
    }
}
