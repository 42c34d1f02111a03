use crate::core::EvaError;
use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub enum AppError {
    Validation(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    /// Details are logged, never returned.
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

impl From<EvaError> for AppError {
    fn from(err: EvaError) -> Self {
        match err {
            EvaError::Validation(message) => Self::Validation(message),
            EvaError::Unauthorized(message) => Self::Unauthorized(message),
            EvaError::Forbidden(message) => Self::Forbidden(message),
            EvaError::NotFound(message) => Self::NotFound(message),
            EvaError::Conflict(message) => Self::Conflict(message),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg, "validation_error"),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, "unauthorized"),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, "forbidden"),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "not_found"),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg, "conflict"),
            Self::Internal(details) => {
                error!(error = %details, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                    "internal_error",
                )
            }
        };

        let body = Json(ErrorResponse {
            error: message,
            code: code.to_string(),
        });
        (status, body).into_response()
    }
}
