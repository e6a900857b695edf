use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContentCacheError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("invalid landscape: selected source {0} is not present in the resource catalog")]
    SelectionNotInCatalog(String),
}

pub type Result<T> = std::result::Result<T, ContentCacheError>;
