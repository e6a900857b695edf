use thiserror::Error;

/// Top-level error, composed only at the `tick()` boundary (§7) — each
/// component crate defines its own error enum and maps into this one rather
/// than every layer sharing one giant enum.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
