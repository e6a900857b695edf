use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, ActivityError>;
