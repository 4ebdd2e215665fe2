use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use std::fmt;
use tracing::error;

/// Application-level error type
#[derive(Debug)]
pub enum AppError {
    /// Malformed identifier, payload, or query parameter
    Validation(String),
    /// Agent absent from the store and the ledger
    NotFound(String),
    /// Duplicate submission
    Conflict(String),
    /// Missing or invalid bearer token
    Unauthorized(String),
    /// Token is valid but lacks the required role
    Forbidden(String),
    /// Rate limit exceeded
    RateLimited { retry_after: u64 },
    /// Data store (or another backing service) failed
    Dependency(String),
    /// Internal server error
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
    meta: ErrorMeta,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

#[derive(Serialize)]
struct ErrorMeta {
    request_id: String,
}

impl AppError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Dependency(_) => "DEPENDENCY_FAILURE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to callers. Server-side failures never leak
    /// their cause.
    fn public_message(&self) -> String {
        match self {
            Self::Dependency(_) => "A backing service failed to handle the request".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "Validation error: {msg}"),
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::Conflict(msg) => write!(f, "Conflict: {msg}"),
            Self::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            Self::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
            Self::RateLimited { retry_after } => {
                write!(f, "Rate limited, retry after {retry_after} seconds")
            }
            Self::Dependency(msg) => write!(f, "Dependency failure: {msg}"),
            Self::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();

        if matches!(self, Self::Dependency(_) | Self::Internal(_)) {
            error!(request_id = %request_id, error = %self, "Request failed");
        }

        let error_response = ErrorResponse {
            error: ErrorBody {
                code: self.error_code().to_string(),
                message: self.public_message(),
            },
            meta: ErrorMeta { request_id },
        };

        match self {
            Self::Dependency(_) | Self::Internal(_) => {
                HttpResponse::InternalServerError().json(error_response)
            }
            Self::Validation(_) => HttpResponse::BadRequest().json(error_response),
            Self::NotFound(_) => HttpResponse::NotFound().json(error_response),
            Self::Conflict(_) => HttpResponse::Conflict().json(error_response),
            Self::Unauthorized(_) => HttpResponse::Unauthorized().json(error_response),
            Self::Forbidden(_) => HttpResponse::Forbidden().json(error_response),
            Self::RateLimited { retry_after } => HttpResponse::TooManyRequests()
                .insert_header(("Retry-After", retry_after.to_string()))
                .json(error_response),
        }
    }
}

impl From<crate::services::StoreError> for AppError {
    fn from(err: crate::services::StoreError) -> Self {
        use crate::services::StoreError;
        match err {
            StoreError::AgentNotFound(id) => Self::NotFound(format!("Agent not found: {id}")),
            StoreError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Dependency(other.to_string()),
        }
    }
}

impl From<crate::services::RateLimitError> for AppError {
    fn from(err: crate::services::RateLimitError) -> Self {
        match err {
            crate::services::RateLimitError::RateLimited { retry_after, .. } => {
                Self::RateLimited { retry_after }
            }
        }
    }
}

impl From<crate::services::AuthError> for AppError {
    fn from(err: crate::services::AuthError) -> Self {
        use crate::services::AuthError;
        match err {
            AuthError::MissingRole(_) => Self::Forbidden(err.to_string()),
            AuthError::SecretTooShort { .. } => Self::Internal(err.to_string()),
            other => Self::Unauthorized(other.to_string()),
        }
    }
}
