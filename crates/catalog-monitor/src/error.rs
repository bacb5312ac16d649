#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("conversation store error: {0}")]
    Conversation(#[from] catalog_conversation::error::ConversationError),

    #[error("user store error: {0}")]
    User(#[from] catalog_users::error::UserError),

    #[error("lead pipeline error: {0}")]
    Lead(#[from] catalog_leads::LeadError),

    #[error("vector catalog error: {0}")]
    Vector(#[from] catalog_vector::VectorError),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
