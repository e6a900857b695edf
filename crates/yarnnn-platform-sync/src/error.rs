use thiserror::Error;

/// Errors from the platform sync engine (§4.2, §7 taxonomy kinds 1–3).
#[derive(Debug, Error)]
pub enum PlatformSyncError {
    /// 429/5xx/timeout — retried with backoff before surfacing here.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// 401/403/invalid_grant — the connection itself is broken.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// 404/410 — the resource or sync cursor is gone; caller should self-heal.
    #[error("resource gone: {0}")]
    Gone(String),

    #[error("content cache error: {0}")]
    ContentCache(#[from] yarnnn_content_cache::ContentCacheError),

    #[error("no client registered for platform {0}")]
    NoClient(String),

    #[error("token decrypt/encrypt error: {0}")]
    Crypto(#[from] yarnnn_core::crypto::CryptoError),
}

pub type Result<T> = std::result::Result<T, PlatformSyncError>;
