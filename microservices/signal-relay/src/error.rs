//! Error types for the signal relay

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session already exists: {0}")]
    SessionExists(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Session closed: {0}")]
    SessionClosed(String),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Malformed body: {0}")]
    Body(#[from] JsonRejection),

    #[error("Malformed query: {0}")]
    Query(#[from] QueryRejection),

    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Error::SessionNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            Error::InvalidRequest(_) | Error::Body(_) | Error::Query(_) | Error::Validation(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            Error::SessionExists(_) | Error::SessionClosed(_) | Error::InvalidTransition(_) => {
                (StatusCode::CONFLICT, self.to_string())
            }
            Error::Internal(_) => {
                tracing::error!("Internal error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}
