use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliverableError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("content cache error: {0}")]
    ContentCache(#[from] yarnnn_content_cache::ContentCacheError),

    #[error("memory store error: {0}")]
    Memory(#[from] yarnnn_memory::MemoryError),

    #[error("activity log error: {0}")]
    Activity(#[from] yarnnn_activity::ActivityError),

    #[error("generation call failed: {0}")]
    Completions(#[from] yarnnn_core::completions::CompletionsError),

    #[error("deliverable {0} not found")]
    NotFound(String),

    /// §9 redesign decision: an empty draft after the tool loop exits is a
    /// hard failure — no partial content is ever persisted.
    #[error("generation loop exited with an empty draft")]
    EmptyDraft,

    #[error("no exporter available for destination platform '{0}'")]
    NoExporter(String),

    /// §4.4 Step 7: every configured destination failed — a `Partial`
    /// delivery still counts as a completed run, but a wholly failed one
    /// does not.
    #[error("delivery failed for every destination: {0}")]
    DeliveryFailed(String),
}

pub type Result<T> = std::result::Result<T, DeliverableError>;
