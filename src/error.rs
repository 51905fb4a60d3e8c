//! Error types for the personal-finance assistant

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AdvisorError>;

#[derive(Error, Debug)]
pub enum AdvisorError {

    // =============================
    // Pipeline Errors
    // =============================

    #[error("Invalid profile: {0}")]
    Validation(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("LLM error: {0}")]
    Inference(String),

    #[error("Empty response from model: {0}")]
    EmptyResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audit error: {0}")]
    Audit(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Search index error: {0}")]
    SearchIndexError(#[from] tantivy::TantivyError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid profile: {0}")]
    ValidationErrors(#[from] validator::ValidationErrors),
}

impl AdvisorError {
    /// True for errors caused by the caller's input rather than a collaborator
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AdvisorError::Validation(_)
                | AdvisorError::ValidationErrors(_)
                | AdvisorError::SerializationError(_)
        )
    }
}
