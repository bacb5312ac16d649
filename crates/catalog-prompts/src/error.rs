use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, PromptError>;
