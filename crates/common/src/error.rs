//! Common error types and handling for Tubeflow

/// Common result type
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Tubeflow workflow engine
///
/// Callers (CLI, web layer) relay these verbatim; `error_code` gives them a
/// stable machine-readable tag.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unexpected error: {0}")]
    Unexpected(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Stage {stage} failed: {message}")]
    Generator { stage: String, message: String },

    #[error("Stage {stage} timed out after {seconds}s")]
    Timeout { stage: String, seconds: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the error code relayed to callers
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Unexpected(_) => "UNEXPECTED_ERROR",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Configuration(_) => "CONFIGURATION_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::InvalidState(_) => "INVALID_STATE",
            Error::Generator { .. } => "GENERATOR_ERROR",
            Error::Timeout { .. } => "TIMEOUT",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the failure was recorded on a stage and can be retried by the caller
    pub fn is_stage_failure(&self) -> bool {
        matches!(self, Error::Generator { .. } | Error::Timeout { .. })
    }
}
