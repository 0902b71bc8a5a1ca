//! Unified application error model and HTTP mapping helpers.
//! Every failure surfaced to a caller goes through `AppError` so the status code and the
//! machine-readable code stay stable across handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::identity::{Action, Role};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AppError {
    #[error("token is malformed or its signature does not verify")]
    TokenInvalid,
    #[error("token has expired")]
    TokenExpired,
    #[error("token has been revoked")]
    TokenRevoked,
    #[error("authentication required")]
    Unauthenticated,
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("{} may not {action} {resource_id}", role_label(.role))]
    AuthorizationDenied { role: Option<Role>, resource_id: String, action: Action },
    #[error("session {0} is not in progress")]
    SessionNotActive(i64),
    #[error("session {0} is already completed")]
    AlreadyCompleted(i64),
    #[error("session {0} is already aborted")]
    AlreadyAborted(i64),
    #[error("subject {0} not found")]
    SubjectNotFound(String),
    #[error("{0} not found")]
    ResourceNotFound(String),
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code_str(&self) -> &'static str {
        match self {
            AppError::TokenInvalid => "token_invalid",
            AppError::TokenExpired => "token_expired",
            AppError::TokenRevoked => "token_revoked",
            AppError::Unauthenticated => "unauthenticated",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::AuthorizationDenied { .. } => "authorization_denied",
            AppError::SessionNotActive(_) => "session_not_active",
            AppError::AlreadyCompleted(_) => "already_completed",
            AppError::AlreadyAborted(_) => "already_aborted",
            AppError::SubjectNotFound(_) => "subject_not_found",
            AppError::ResourceNotFound(_) => "resource_not_found",
            AppError::ValidationFailed(_) => "validation_failed",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self { AppError::ResourceNotFound(what.into()) }
    pub fn invalid(msg: impl Into<String>) -> Self { AppError::ValidationFailed(msg.into()) }
    pub fn internal(msg: impl Into<String>) -> Self { AppError::Internal(msg.into()) }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::TokenInvalid
            | AppError::TokenExpired
            | AppError::TokenRevoked
            | AppError::Unauthenticated
            | AppError::InvalidCredentials => 401,
            AppError::AuthorizationDenied { .. } => 403,
            AppError::SubjectNotFound(_) | AppError::ResourceNotFound(_) => 404,
            AppError::SessionNotActive(_) | AppError::AlreadyCompleted(_) | AppError::AlreadyAborted(_) => 409,
            AppError::ValidationFailed(_) => 400,
            AppError::Internal(_) => 500,
        }
    }
}

fn role_label(role: &Option<Role>) -> &'static str {
    role.map(|r| r.as_str()).unwrap_or("anonymous")
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({
            "status": "error",
            "code": self.code_str(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
