use thiserror::Error;

/// Workspace-wide error taxonomy (`spec.md` §7). Every crate that needs its
/// own variants defines a local `thiserror::Error` enum with a `code()`
/// method in this same shape; `CatalogError` is the shared top-level type
/// used by configuration and by code with no narrower home.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient external error: {0}")]
    TransientExternal(String),

    #[error("permanent external error: {0}")]
    PermanentExternal(String),

    #[error("cost limit exceeded")]
    CostLimitExceeded,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CatalogError {
    /// Short error code, e.g. for inclusion in structured log fields.
    pub fn code(&self) -> &'static str {
        match self {
            CatalogError::Validation(_) => "VALIDATION_ERROR",
            CatalogError::NotFound(_) => "NOT_FOUND",
            CatalogError::TransientExternal(_) => "TRANSIENT_EXTERNAL_ERROR",
            CatalogError::PermanentExternal(_) => "PERMANENT_EXTERNAL_ERROR",
            CatalogError::CostLimitExceeded => "COST_LIMIT_EXCEEDED",
            CatalogError::Config(_) => "CONFIG_ERROR",
            CatalogError::Database(_) => "DATABASE_ERROR",
            CatalogError::Serialization(_) => "SERIALIZATION_ERROR",
            CatalogError::Io(_) => "IO_ERROR",
            CatalogError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
