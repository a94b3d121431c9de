//! Error types for chorus-server
//!
//! Every handler returns [`ApiResult`]. Job and render errors are mapped to
//! HTTP status codes here so handlers can use `?` throughout.

use crate::clips::RenderError;
use crate::jobs::JobError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - e.g., job already running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// chorus-common error
    #[error("Common error: {0}")]
    Common(#[from] chorus_common::Error),
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        let message = err.to_string();
        match err {
            JobError::UnknownJob(_) => ApiError::NotFound(message),
            JobError::InvalidJobId(_) => ApiError::BadRequest(message),
            JobError::AlreadyRunning(_) | JobError::AlreadyStarted(_) | JobError::StillRunning(_) => {
                ApiError::Conflict(message)
            }
            JobError::ConfigWrite(_) | JobError::Spawn { .. } | JobError::Manifest(_) => {
                ApiError::Internal(message)
            }
            JobError::Io(e) => ApiError::Io(e),
        }
    }
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        let message = err.to_string();
        match err {
            RenderError::FileNotFound(_) => ApiError::NotFound(message),
            RenderError::InvalidRequest(_) => ApiError::BadRequest(message),
            RenderError::Decode(_)
            | RenderError::Resample(_)
            | RenderError::Encode(_)
            | RenderError::Internal(_) => ApiError::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
            ApiError::Io(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                err.to_string(),
            ),
            ApiError::Common(ref err) => match err {
                chorus_common::Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
                chorus_common::Error::InvalidInput(_) => {
                    (StatusCode::BAD_REQUEST, "BAD_REQUEST", err.to_string())
                }
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "COMMON_ERROR",
                    err.to_string(),
                ),
            },
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
