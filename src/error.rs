//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout evinit.
//! All errors are structured and map to stable error codes.
//!
//! # Error Categories
//! - `Validation`: malformed database name or table-type value
//! - `AlreadyExists`: target database name already present on the server
//! - `Connectivity`: connection acquisition failure, drop, or timeout
//! - `DdlExecution`: a creation statement rejected by the server
//! - `InvariantViolation`: catalog query returned an unexpected row shape
//! - `Config`: configuration file or SQL template errors

use thiserror::Error;

/// Main error type for provisioning operations
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Malformed database name or table-type value, raised before any
    /// network access
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Target database name already present on the server
    #[error("Database \"{database}\" already exists")]
    AlreadyExists { database: String },

    /// Connection acquisition failure, mid-operation drop, or timeout
    #[error("Connection error for database \"{database}\": {detail}")]
    Connectivity { database: String, detail: String },

    /// A creation statement was rejected by the server
    #[error("Failed to create {object} in database \"{database}\": {detail}")]
    DdlExecution { object: String, database: String, detail: String },

    /// Existence check returned a row shape outside the two expected cases
    #[error("Invariant violation for database \"{database}\": {detail}")]
    InvariantViolation { database: String, detail: String },

    /// Configuration file or SQL template error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Stable error kind, suitable for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    AlreadyExists,
    Connectivity,
    DdlExecution,
    InvariantViolation,
    Config,
}

impl ProvisionError {
    /// Classify this error into its stable kind
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::Connectivity { .. } => ErrorKind::Connectivity,
            Self::DdlExecution { .. } => ErrorKind::DdlExecution,
            Self::InvariantViolation { .. } => ErrorKind::InvariantViolation,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Convert error to an error code string
    ///
    /// Error codes are stable and suitable for programmatic handling.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::AlreadyExists => "ALREADY_EXISTS",
            ErrorKind::Connectivity => "CONNECTIVITY_ERROR",
            ErrorKind::DdlExecution => "DDL_EXECUTION_ERROR",
            ErrorKind::InvariantViolation => "INVARIANT_VIOLATION",
            ErrorKind::Config => "CONFIG_ERROR",
        }
    }

    /// Get human-readable error message (no credentials, safe to log)
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an already-exists error
    pub fn already_exists(database: impl Into<String>) -> Self {
        Self::AlreadyExists { database: database.into() }
    }

    /// Create a connectivity error
    pub fn connectivity(database: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Connectivity { database: database.into(), detail: detail.into() }
    }

    /// Create a DDL execution error
    pub fn ddl_execution(
        object: impl Into<String>,
        database: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::DdlExecution {
            object: object.into(),
            database: database.into(),
            detail: detail.into(),
        }
    }

    /// Create an invariant violation error
    pub fn invariant_violation(database: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvariantViolation { database: database.into(), detail: detail.into() }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Result type alias for provisioning operations
pub type Result<T> = std::result::Result<T, ProvisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ProvisionError::validation("test").error_code(), "VALIDATION_ERROR");
        assert_eq!(ProvisionError::already_exists("db").error_code(), "ALREADY_EXISTS");
        assert_eq!(ProvisionError::connectivity("db", "test").error_code(), "CONNECTIVITY_ERROR");
        assert_eq!(
            ProvisionError::ddl_execution("events table", "db", "test").error_code(),
            "DDL_EXECUTION_ERROR"
        );
        assert_eq!(
            ProvisionError::invariant_violation("db", "test").error_code(),
            "INVARIANT_VIOLATION"
        );
        assert_eq!(ProvisionError::config("test").error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(ProvisionError::validation("test").kind(), ErrorKind::Validation);
        assert_eq!(ProvisionError::already_exists("db").kind(), ErrorKind::AlreadyExists);
        assert_eq!(ProvisionError::connectivity("db", "x").kind(), ErrorKind::Connectivity);
        assert_eq!(
            ProvisionError::ddl_execution("id table", "db", "x").kind(),
            ErrorKind::DdlExecution
        );
        assert_eq!(
            ProvisionError::invariant_violation("db", "x").kind(),
            ErrorKind::InvariantViolation
        );
        assert_eq!(ProvisionError::config("x").kind(), ErrorKind::Config);
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = ProvisionError::ddl_execution("events_ts index", "events_demo", "syntax error");
        assert!(err.message().contains("events_ts index"));
        assert!(err.message().contains("events_demo"));
        assert!(err.message().contains("syntax error"));

        let err = ProvisionError::already_exists("events_demo");
        assert!(err.message().contains("events_demo"));
        assert!(err.message().contains("already exists"));
    }
}
