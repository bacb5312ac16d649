#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CRM API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("CRM client is not configured (missing CRM_API_URL)")]
    NotConfigured,
}

pub type Result<T> = std::result::Result<T, CrmError>;
