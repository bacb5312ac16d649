use thiserror::Error;

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("embedding failed: {0}")]
    Embed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VectorError>;
