use thiserror::Error;

/// Composed only at the `tick()` boundary (§7): every phase's own error type
/// maps into one variant here rather than the phases sharing one giant enum.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] yarnnn_core::error::OrchestratorError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("content cache error: {0}")]
    ContentCache(#[from] yarnnn_content_cache::ContentCacheError),

    #[error("platform sync error: {0}")]
    PlatformSync(#[from] yarnnn_platform_sync::PlatformSyncError),

    #[error("signal processing error: {0}")]
    Signal(#[from] yarnnn_signals::SignalError),

    #[error("deliverable engine error: {0}")]
    Deliverable(#[from] yarnnn_deliverables::DeliverableError),

    #[error("memory store error: {0}")]
    Memory(#[from] yarnnn_memory::MemoryError),

    #[error("activity log error: {0}")]
    Activity(#[from] yarnnn_activity::ActivityError),

    #[error("token cipher error: {0}")]
    Crypto(#[from] yarnnn_core::crypto::CryptoError),

    #[error("connection {0} not found")]
    ConnectionNotFound(String),

    #[error("no access token on file for connection {0}")]
    NoAccessToken(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
