//! Clip rendering errors

use thiserror::Error;

/// Failure rendering a single clip. Always reported per clip, never per batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid clip request: {0}")]
    InvalidRequest(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Resample error: {0}")]
    Resample(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Internal render error: {0}")]
    Internal(String),
}
