use thiserror::Error;

/// Common error type for Assay operations.
///
/// Bad records are not errors: the validator reports them as
/// [`Validation::Invalid`](crate::models::Validation::Invalid). This type
/// covers configuration and infrastructure failures only.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Stream processing error: {0}")]
    StreamProcessing(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("External service error: {0}")]
    ExternalService(String),
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
