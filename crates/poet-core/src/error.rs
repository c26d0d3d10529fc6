//! Error types for photo-poet.

use thiserror::Error;

use crate::schema::ValidationError;

/// Result type alias using photo-poet's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for photo-poet operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Caller-supplied data failed a precondition (e.g. missing photo)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Data did not conform to its declared shape
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Photo analysis call failed
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// Poem generation call failed
    #[error("Generation error: {0}")]
    Generation(String),

    /// Action requested out of sequence
    #[error("State error: {0}")]
    State(String),

    /// In-flight request was superseded or abandoned before it resolved
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Inference backend failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Feature exists in the UI but has no implementation
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
