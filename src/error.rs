// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::query::QueryError;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    // 500 Internal Server Error (backend failures, message is logged, not returned)
    InternalServerError(String),

    // 400 Bad Request (validation)
    BadRequest(String),

    // 401 Unauthorized (no or invalid identity)
    AuthError(String),

    // 403 Forbidden (caller does not own the entity)
    Forbidden(String),

    // 404 Not Found (absent or soft-deleted)
    NotFound(String),

    // 422 Unprocessable Entity (parent entity absent or soft-deleted)
    DependencyUnavailable(String),

    // 409 Conflict (e.g., duplicate like)
    Conflict(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Status code and the message safe to show to a client.
    pub fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::DependencyUnavailable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }
}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = self.status_and_message();
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Lets repositories use `?` on adapter results.
impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::NotFound => AppError::NotFound("Not found".to_string()),
            QueryError::InvalidFilter { .. } => AppError::BadRequest(err.message()),
            QueryError::Conflict(msg) => AppError::Conflict(msg),
            QueryError::TooManyRows(_) | QueryError::Backend(_) | QueryError::Decode(_) => {
                AppError::InternalServerError(err.message())
            }
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
