//! Error types for the stored-procedure gateway.
//!
//! This module defines all error types using `thiserror`. Every variant maps
//! to a stable machine-readable code and an HTTP status so the response layer
//! can render any failure as a uniform JSON envelope.

use axum::http::StatusCode;
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use thiserror::Error;

/// A field-level validation error, as produced by a request shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Path of the offending field within the merged candidate object.
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation failed")]
    Validation { errors: Vec<FieldError> },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Permission denied: {operation} - {reason}")]
    PermissionDenied { operation: String, reason: String },

    #[error("Connection failed: {message}")]
    Connection { message: String },

    #[error("Transaction error: {message} (transaction: {transaction_id})")]
    Transaction {
        message: String,
        transaction_id: String,
    },

    #[error("Execution failed: {message}")]
    Execution {
        message: String,
        /// Native error code, e.g. "42883" for an undefined routine.
        sql_state: Option<String>,
    },

    #[error("Result shape mismatch: {message}")]
    ShapeMismatch { message: String },

    #[error("{message}")]
    General { message: String },
}

impl ApiError {
    /// Create a validation error from a list of field errors.
    pub fn validation(errors: Vec<FieldError>) -> Self {
        Self::Validation { errors }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a permission denied error.
    pub fn permission_denied(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PermissionDenied {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>, transaction_id: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            transaction_id: transaction_id.into(),
        }
    }

    /// Create an execution error with an optional native error code.
    pub fn execution(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Execution {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a result shape mismatch error.
    pub fn shape_mismatch(message: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            message: message.into(),
        }
    }

    /// Create a catch-all error.
    pub fn general(message: impl Into<String>) -> Self {
        Self::General {
            message: message.into(),
        }
    }

    /// Stable machine-readable code for the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::Connection { .. } => "CONNECTION_ERROR",
            Self::Transaction { .. } => "TRANSACTION_ERROR",
            Self::Execution { .. } => "EXECUTION_ERROR",
            Self::ShapeMismatch { .. } => "SHAPE_MISMATCH",
            Self::General { .. } => "GENERAL_ERROR",
        }
    }

    /// HTTP status this error renders as.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            Self::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            Self::Connection { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Transaction { .. }
            | Self::Execution { .. }
            | Self::ShapeMismatch { .. }
            | Self::General { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Structured details for the error envelope, if this error carries any.
    pub fn details(&self) -> Option<JsonValue> {
        match self {
            Self::Validation { errors } => Some(json!(errors)),
            Self::Execution {
                sql_state: Some(code),
                ..
            } => Some(json!({ "sqlState": code })),
            _ => None,
        }
    }
}

/// Convert sqlx errors to ApiError.
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => ApiError::connection(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                ApiError::execution(db_err.message().to_string(), code)
            }
            sqlx::Error::PoolTimedOut => {
                ApiError::connection("Timed out acquiring a connection from the pool")
            }
            sqlx::Error::PoolClosed => ApiError::connection("Connection pool is closed"),
            sqlx::Error::Io(io_err) => ApiError::connection(format!("I/O error: {io_err}")),
            sqlx::Error::Tls(tls_err) => ApiError::connection(format!("TLS error: {tls_err}")),
            sqlx::Error::Protocol(msg) => ApiError::connection(format!("Protocol error: {msg}")),
            sqlx::Error::RowNotFound => ApiError::execution("No rows returned", None),
            sqlx::Error::ColumnDecode { index, source } => {
                ApiError::execution(format!("Failed to decode column {index}: {source}"), None)
            }
            sqlx::Error::Decode(source) => {
                ApiError::execution(format!("Decode error: {source}"), None)
            }
            sqlx::Error::WorkerCrashed => ApiError::general("Database worker crashed"),
            other => ApiError::general(format!("Unknown database error: {other}")),
        }
    }
}

/// Result type alias for gateway operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ApiError::connection("refused");
        assert!(err.to_string().contains("Connection failed"));

        let err = ApiError::transaction("already completed", "tx_1");
        assert!(err.to_string().contains("tx_1"));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::validation(vec![]).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::permission_denied("CREATE", "not declared").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::connection("down").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::shape_mismatch("2 names, 1 table").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::general("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_stable_codes() {
        assert_eq!(ApiError::validation(vec![]).code(), "VALIDATION_ERROR");
        assert_eq!(
            ApiError::execution("bad call", None).code(),
            "EXECUTION_ERROR"
        );
        assert_eq!(ApiError::shape_mismatch("x").code(), "SHAPE_MISMATCH");
    }

    #[test]
    fn test_validation_details_carry_field_errors() {
        let err = ApiError::validation(vec![FieldError::new("id", "required")]);
        let details = err.details().unwrap();
        assert_eq!(details[0]["field"], "id");
        assert_eq!(details[0]["message"], "required");
    }

    #[test]
    fn test_execution_details_carry_sql_state() {
        let err = ApiError::execution("undefined routine", Some("42883".to_string()));
        let details = err.details().unwrap();
        assert_eq!(details["sqlState"], "42883");

        let err = ApiError::execution("plain", None);
        assert!(err.details().is_none());
    }

    #[test]
    fn test_from_sqlx_pool_errors() {
        let err: ApiError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, ApiError::Connection { .. }));

        let err: ApiError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, ApiError::Connection { .. }));

        let err: ApiError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, ApiError::Execution { .. }));
    }
}
