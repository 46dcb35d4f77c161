// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::auth::AuthError;
use crate::database::DatabaseError;
use crate::jobs::JobError;
use crate::ops::OpsError;
use crate::services::ServiceError;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 413 Payload Too Large
    PayloadTooLarge(String),

    // 415 Unsupported Media Type
    UnsupportedMediaType(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 502 Bad Gateway (external service issues)
    BadGateway(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::PayloadTooLarge(msg) => msg,
            ApiError::UnsupportedMediaType(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::BadGateway(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::BadGateway(_) => "BAD_GATEWAY",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "success": false,
            "error": self.message(),
            "code": self.error_code()
        });

        if let ApiError::ValidationError { field_errors: Some(field_errors), .. } = self {
            body["field_errors"] = json!(field_errors);
        }

        body
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(message: impl Into<String>, field_errors: Option<HashMap<String, String>>) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    /// Single-field validation failure
    pub fn field_error(field: &str, message: impl Into<String>) -> Self {
        let mut field_errors = HashMap::new();
        field_errors.insert(field.to_string(), message.into());
        ApiError::validation_error("Invalid field value", Some(field_errors))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        ApiError::PayloadTooLarge(message.into())
    }

    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        ApiError::UnsupportedMediaType(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        ApiError::BadGateway(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Convert other error types to ApiError
impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => ApiError::not_found(msg),
            DatabaseError::Conflict(msg) => ApiError::conflict(msg),
            DatabaseError::Invalid(msg) => ApiError::bad_request(msg),
            DatabaseError::ConfigMissing(name) => {
                tracing::error!("Database configuration missing: {}", name);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            DatabaseError::Sqlx(sqlx::Error::PoolTimedOut) | DatabaseError::Sqlx(sqlx::Error::Io(_)) => {
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            DatabaseError::Sqlx(sqlx_err) => {
                // Log the real error but return generic message
                tracing::error!("SQLx error: {}", sqlx_err);
                ApiError::internal_server_error("Database error occurred")
            }
            DatabaseError::Migration(msg) => {
                tracing::error!("Migration error: {}", msg);
                ApiError::service_unavailable("Service is being updated, please try again later")
            }
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation { field, message } => ApiError::field_error(field, message),
            ServiceError::BadRequest(msg) => ApiError::bad_request(msg),
            ServiceError::NotFound(what) => ApiError::not_found(format!("{} not found", what)),
            ServiceError::Conflict(msg) => ApiError::conflict(msg),
            ServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            ServiceError::PlanLimit(msg) => ApiError::forbidden(format!("Plan limit reached: {}", msg)),
            ServiceError::PayloadTooLarge(msg) => ApiError::payload_too_large(msg),
            ServiceError::UnsupportedMediaType(msg) => ApiError::unsupported_media_type(msg),
            ServiceError::Upstream(msg) => {
                tracing::warn!("Upstream service error: {}", msg);
                ApiError::bad_gateway("Upstream service error")
            }
            ServiceError::Io(e) => {
                tracing::error!("I/O error: {}", e);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            ServiceError::Database(e) => e.into(),
            ServiceError::Job(e) => e.into(),
            ServiceError::Auth(e) => e.into(),
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Busy(msg) => ApiError::conflict(msg),
            JobError::Conflict { .. } | JobError::InvalidTransition { .. } => ApiError::conflict(err.to_string()),
            JobError::NotFound(id) => ApiError::not_found(format!("Operation {} not found", id)),
            JobError::Database(e) => e.into(),
        }
    }
}

impl From<OpsError> for ApiError {
    fn from(err: OpsError) -> Self {
        match err {
            OpsError::NotFound(what) => ApiError::not_found(format!("{} not found", what)),
            OpsError::Rejected(msg) => ApiError::conflict(msg),
            OpsError::ChecksumMismatch { .. } => ApiError::conflict(err.to_string()),
            OpsError::NotConfigured(what) => ApiError::service_unavailable(format!("{} is not configured", what)),
            OpsError::Download(msg) | OpsError::Manifest(msg) => {
                tracing::warn!("Update source error: {}", msg);
                ApiError::bad_gateway(msg)
            }
            OpsError::Database(e) => e.into(),
            OpsError::Job(e) => e.into(),
            OpsError::Spawn { .. } | OpsError::CommandFailed { .. } | OpsError::Io(_) => {
                tracing::error!("System operation failed: {}", err);
                ApiError::internal_server_error("System operation failed")
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::unauthorized("Invalid credentials"),
            AuthError::InvalidToken(msg) => ApiError::unauthorized(msg),
            AuthError::Inactive => ApiError::forbidden("Account is disabled"),
            AuthError::WeakPassword => ApiError::field_error("password", "Password must be at least 8 characters"),
            AuthError::Hash(msg) | AuthError::TokenGeneration(msg) => {
                tracing::error!("Authentication internals failed: {}", msg);
                ApiError::internal_server_error("Authentication failed")
            }
            AuthError::MissingSecret => {
                tracing::error!("JWT secret is not configured");
                ApiError::service_unavailable("Authentication is not configured")
            }
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_carries_field_errors() {
        let err = ApiError::field_error("slug", "must be lowercase");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        let body = err.to_json();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["field_errors"]["slug"], "must be lowercase");
    }

    #[test]
    fn service_errors_map_to_statuses() {
        let not_found: ApiError = ServiceError::NotFound("Page").into();
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(not_found.message(), "Page not found");

        let limit: ApiError = ServiceError::PlanLimit("max_pages".into()).into();
        assert_eq!(limit.status_code(), StatusCode::FORBIDDEN);

        let conflict: ApiError = DatabaseError::Conflict("slug already exists".into()).into();
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn ops_errors_map_to_statuses() {
        let busy: ApiError = OpsError::Job(JobError::Busy("backup already running".into())).into();
        assert_eq!(busy.status_code(), StatusCode::CONFLICT);

        let missing: ApiError = OpsError::NotConfigured("update manifest URL").into();
        assert_eq!(missing.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let failed: ApiError = OpsError::CommandFailed {
            program: "pg_dump".into(),
            status: "exit status: 1".into(),
            stderr: "password authentication failed".into(),
        }
        .into();
        assert_eq!(failed.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!failed.message().contains("password"));
    }

    #[test]
    fn internal_errors_hide_details() {
        let err: ApiError = DatabaseError::Sqlx(sqlx::Error::Protocol("secret detail".into())).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message().contains("secret"));
    }
}
