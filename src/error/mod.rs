//! Unified error handling for Campus Core

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
///
/// The first three variants are the request-gate taxonomy: they map to
/// 404/403/503 so operators can tell bad requests (unknown host,
/// suspended school) apart from infrastructure trouble (unreachable
/// tenant database, registry outage, credential decryption failure).
#[derive(Error, Debug)]
pub enum AppError {
    #[error("No tenant found for host '{0}'")]
    DomainNotFound(String),

    #[error("Tenant {0} is suspended")]
    TenantSuspended(String),

    #[error("Connection unavailable: {0}")]
    ConnectionUnavailable(String),

    #[error("Provisioning failed for database '{database}': {message}")]
    Provisioning {
        database: String,
        message: String,
        /// Set when best-effort cleanup also failed and an operator must
        /// remove the partially created database/user by hand.
        manual_cleanup_required: bool,
    },

    #[error("Deletion failed: {0}")]
    Deletion(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::DomainNotFound(host) => {
                tracing::warn!(host = %host, "Domain resolved to no tenant");
                (
                    StatusCode::NOT_FOUND,
                    "domain_not_found",
                    "No school is registered for this address".to_string(),
                )
            }
            AppError::TenantSuspended(tenant_id) => {
                tracing::warn!(tenant_id = %tenant_id, "Request to suspended tenant");
                (
                    StatusCode::FORBIDDEN,
                    "tenant_suspended",
                    "This school is currently suspended".to_string(),
                )
            }
            AppError::ConnectionUnavailable(msg) => {
                tracing::error!("Connection unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "connection_unavailable",
                    "The service is temporarily unavailable".to_string(),
                )
            }
            AppError::Provisioning {
                database,
                message,
                manual_cleanup_required,
            } => {
                tracing::error!(
                    database = %database,
                    manual_cleanup_required = manual_cleanup_required,
                    "Provisioning failed: {}",
                    message
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "provisioning_failed",
                    "Tenant provisioning failed".to_string(),
                )
            }
            AppError::Deletion(msg) => {
                tracing::error!("Tenant deletion failed: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "deletion_failed",
                    "Tenant deletion failed; manual cleanup may be required".to_string(),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            AppError::Validation(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation", msg.clone())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Cache(e) => {
                tracing::error!("Cache error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "cache_error",
                    "A cache error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

// Conversion from validation errors
impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}
