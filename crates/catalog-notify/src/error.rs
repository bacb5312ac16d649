use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("telegram send failed: {0}")]
    Telegram(String),
    #[error("smtp send failed: {0}")]
    Smtp(String),
    #[error("not configured")]
    NotConfigured,
}

pub type Result<T> = std::result::Result<T, NotifyError>;
