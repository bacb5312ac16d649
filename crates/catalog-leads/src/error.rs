use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeadError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("lead not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(#[from] LeadValidationError),
}

pub type Result<T> = std::result::Result<T, LeadError>;

/// `spec.md` §4.8's validation rules, surfaced to the orchestrator so it
/// can ask the user a clarifying question rather than silently dropping
/// the lead (Design Notes item 6 — no panics for expected user input).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LeadValidationError {
    #[error("last name is required")]
    MissingLastName,

    #[error("at least one of phone or email is required")]
    MissingContact,

    #[error("phone number is not in a valid format")]
    InvalidPhone,

    #[error("email address is not in a valid format")]
    InvalidEmail,
}
