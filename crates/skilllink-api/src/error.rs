//! API error handling.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// No valid session.
    Unauthenticated(String),
    /// The actor is known but may not do this.
    Forbidden(String),
    Conflict(String),
    InvalidTransition(String),
    Internal(String),
}

impl ApiError {
    fn parts(self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_input", msg),
            ApiError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, "unauthenticated", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "unauthorized", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::InvalidTransition(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_transition", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = self.parts();
        if status.is_server_error() {
            error!(error = %message, "Request failed");
        }

        let body = Json(json!({
            "error": message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}

impl From<skilllink_core::Error> for ApiError {
    fn from(err: skilllink_core::Error) -> Self {
        match err {
            skilllink_core::Error::NotFound(msg) => ApiError::NotFound(msg),
            skilllink_core::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            skilllink_core::Error::Unauthorized(msg) => ApiError::Forbidden(msg),
            skilllink_core::Error::InvalidTransition(msg) => ApiError::InvalidTransition(msg),
            skilllink_core::Error::Conflict(msg) => ApiError::Conflict(msg),
            skilllink_core::Error::Internal(msg) => ApiError::Internal(msg),
        }
    }
}
