//! Error types for detangle

use thiserror::Error;

use crate::backend::BackendId;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Detangle errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("Code parse error: {0}")]
    Parse(String),

    #[error("Transform failed in {backend} backend: {reason}")]
    TransformFailed { backend: BackendId, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}
