//! Error types for Bibliotheca server

use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::role::Role;

/// Stable error codes carried in every error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthenticated = 2,
    AccessDenied = 3,
    RoleCreationDenied = 4,
    NotFound = 5,
    InvalidArgument = 6,
    ValidationFailed = 7,
    InvalidState = 8,
    Unavailable = 9,
    DbFailure = 10,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Access denied: {0}")]
    Authorization(String),

    #[error("Creating a user with role {0} requires the ADMIN role")]
    RoleCreation(Role),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        fields: BTreeMap<String, String>,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Single-field validation failure
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        AppError::Validation {
            message: message.clone(),
            fields: BTreeMap::from([(field.to_string(), message)]),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Authorization(_) | AppError::RoleCreation(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidArgument(_) | AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Authentication(_) => ErrorCode::NotAuthenticated,
            AppError::Authorization(_) => ErrorCode::AccessDenied,
            AppError::RoleCreation(_) => ErrorCode::RoleCreationDenied,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            AppError::Validation { .. } => ErrorCode::ValidationFailed,
            AppError::Conflict(_) => ErrorCode::InvalidState,
            AppError::Unavailable(_) => ErrorCode::Unavailable,
            AppError::Database(_) => ErrorCode::DbFailure,
            AppError::Internal(_) => ErrorCode::Failure,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => {
                AppError::Unavailable("Timed out waiting for a database connection".to_string())
            }
            other => AppError::Database(other),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let fields: BTreeMap<String, String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let message = errs
                    .iter()
                    .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
                    .or_else(|| errs.first().map(|e| e.code.to_string()))
                    .unwrap_or_else(|| "invalid".to_string());
                (field.to_string(), message)
            })
            .collect();

        AppError::Validation {
            message: "Request validation failed".to_string(),
            fields,
        }
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub status: u16,
    pub code: u32,
    pub error: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Field-level messages for validation failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, String>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let (message, fields) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                ("Database error".to_string(), None)
            }
            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                ("Internal server error".to_string(), None)
            }
            AppError::Unavailable(ref msg) => {
                tracing::warn!("Transient failure: {}", msg);
                (msg.clone(), None)
            }
            AppError::Validation { message, fields } => (message, Some(fields)),
            AppError::RoleCreation(role) => (
                format!("Creating a user with role {} requires the ADMIN role", role),
                None,
            ),
            AppError::Authentication(msg)
            | AppError::Authorization(msg)
            | AppError::NotFound(msg)
            | AppError::InvalidArgument(msg)
            | AppError::Conflict(msg) => (msg, None),
        };

        let body = Json(ErrorResponse {
            status: status.as_u16(),
            code: code as u32,
            error: format!("{:?}", code),
            message,
            timestamp: Utc::now(),
            fields,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
