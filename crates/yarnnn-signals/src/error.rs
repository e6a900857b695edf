use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("content cache error: {0}")]
    ContentCache(#[from] yarnnn_content_cache::ContentCacheError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("reasoning pass failed: {0}")]
    Completions(#[from] yarnnn_core::completions::CompletionsError),
}

pub type Result<T> = std::result::Result<T, SignalError>;
