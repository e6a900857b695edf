use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("no exporter registered for platform '{0}'")]
    NotRegistered(String),

    #[error("destination is invalid for the '{0}' exporter: {1}")]
    InvalidDestination(String, String),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("exporter provider error: {0}")]
    Provider(String),
}

pub type Result<T> = std::result::Result<T, ExporterError>;
