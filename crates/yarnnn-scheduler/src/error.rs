use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("lock {0:?} is held by another in-flight operation")]
    LockHeld(crate::types::LockKey),

    #[error("queue {0:?} is at capacity, work dropped")]
    QueueFull(crate::types::Queue),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
