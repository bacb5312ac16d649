use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, LoggingError>;
