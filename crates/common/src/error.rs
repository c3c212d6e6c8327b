//! Error types for the points platform.

use serde_json::{Value, json};
use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // === Client Errors ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Gone: {0}")]
    Gone(String),

    #[error("Insufficient balance: {required} points required, {available} available")]
    InsufficientBalance {
        /// Points the operation needed.
        required: i64,
        /// Points the user actually holds.
        available: i64,
    },

    // === Server Errors ===
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Shorthand for a `NotFound` error naming the missing resource.
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    /// Shorthand for an `InvalidRequest` error.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest(reason.into())
    }

    /// Shorthand for a `Forbidden` error.
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden(reason.into())
    }

    /// Returns the HTTP status code the route layer should answer with.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            // 4xx Client Errors
            Self::NotFound(_) => 404,
            Self::Unauthorized => 401,
            Self::Forbidden(_) => 403,
            Self::InvalidRequest(_) | Self::Validation(_) | Self::InsufficientBalance { .. } => {
                400
            }
            Self::Conflict(_) => 409,
            Self::Gone(_) => 410,

            // 5xx Server Errors
            Self::Database(_) | Self::Config(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::Gone(_) => "GONE",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Renders the error as the JSON body handed back to API callers.
    ///
    /// Server errors are logged here so the transport layer does not need
    /// its own logging for them.
    #[must_use]
    pub fn to_body(&self) -> Value {
        let code = self.error_code();

        if self.is_server_error() {
            tracing::error!(error = %self, code = code, "Server error occurred");
        } else {
            tracing::debug!(error = %self, code = code, "Client error occurred");
        }

        json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        })
    }
}

// === From implementations ===

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_4xx() {
        assert_eq!(AppError::not_found("user 3").status_code(), 404);
        assert_eq!(AppError::forbidden("nope").status_code(), 403);
        assert_eq!(AppError::invalid("bad").status_code(), 400);
        assert_eq!(AppError::Conflict("dup".into()).status_code(), 409);
        assert_eq!(AppError::Gone("ended".into()).status_code(), 410);
        assert_eq!(
            AppError::InsufficientBalance {
                required: 10,
                available: 3
            }
            .status_code(),
            400
        );
        assert!(!AppError::Gone("full".into()).is_server_error());
    }

    #[test]
    fn test_server_errors_map_to_500() {
        assert_eq!(AppError::Database("down".into()).status_code(), 500);
        assert!(AppError::Internal("boom".into()).is_server_error());
    }

    #[test]
    fn test_body_shape() {
        let body = AppError::InsufficientBalance {
            required: 100,
            available: 40,
        }
        .to_body();

        assert_eq!(body["error"]["code"], "INSUFFICIENT_BALANCE");
        assert_eq!(
            body["error"]["message"],
            "Insufficient balance: 100 points required, 40 available"
        );
    }
}
