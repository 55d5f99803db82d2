//! Error types for the router.
//!
//! This module defines all error types using `thiserror`. Driver failures are
//! converted here, at the adapter boundary, so nothing in the crate panics on a
//! database error. Every variant can be flattened into the normalized
//! `(code, info)` pair exposed by the adapters' and the router's error accessors.

use crate::config::DEFAULT_ACQUIRE_TIMEOUT_SECS;
use crate::models::Role;
use thiserror::Error;

/// Generic SQLSTATE used when the driver does not report a code.
pub const GENERAL_ERROR_CODE: &str = "HY000";

#[derive(Error, Debug)]
pub enum DbError {
    /// The adapter has no bound driver handle.
    #[error("Not connected")]
    NotConnected,

    #[error("Connection failed: {message}")]
    Connection { message: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42S02" for an unknown table
        sql_state: Option<String>,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Transaction error: {message}")]
    Transaction { message: String },

    #[error("No {role} server configured")]
    NoServerConfigured { role: Role },

    #[error(
        "Could not resolve {role} adapter after {attempts} attempt(s): {}",
        .info.as_deref().unwrap_or("no driver error reported")
    )]
    ResolutionFailed {
        role: Role,
        attempts: u32,
        code: Option<String>,
        info: Option<String>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Normalized error code: the driver's SQLSTATE when known, otherwise `HY000`.
    pub fn code(&self) -> String {
        match self {
            Self::Database {
                sql_state: Some(code),
                ..
            } => code.clone(),
            Self::ResolutionFailed {
                code: Some(code), ..
            } => code.clone(),
            _ => GENERAL_ERROR_CODE.to_string(),
        }
    }

    /// Normalized error message: the code and the driver message joined by a space.
    pub fn info(&self) -> String {
        let message = match self {
            Self::NotConnected => "Not connected".to_string(),
            Self::Connection { message } => message.clone(),
            Self::Database { message, .. } => message.clone(),
            Self::Transaction { message } => message.clone(),
            Self::Internal { message } => message.clone(),
            Self::ResolutionFailed {
                info: Some(info), ..
            } => return info.clone(),
            other => other.to_string(),
        };
        [self.code(), message].join(" ")
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => DbError::database("No rows returned", None),
            // The pool adapter replaces this with its configured acquire timeout
            sqlx::Error::PoolTimedOut => {
                DbError::timeout("connection pool acquire", DEFAULT_ACQUIRE_TIMEOUT_SECS)
            }
            sqlx::Error::PoolClosed => DbError::connection("Connection pool is closed"),
            sqlx::Error::Io(io_err) => DbError::connection(format!("I/O error: {}", io_err)),
            sqlx::Error::Tls(tls_err) => DbError::connection(format!("TLS error: {}", tls_err)),
            sqlx::Error::Protocol(msg) => DbError::connection(format!("Protocol error: {}", msg)),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_code_prefers_sql_state() {
        let err = DbError::database("Table 'app.t' doesn't exist", Some("42S02".to_string()));
        assert_eq!(err.code(), "42S02");
        assert_eq!(err.info(), "42S02 Table 'app.t' doesn't exist");
    }

    #[test]
    fn test_code_falls_back_to_general_error() {
        let err = DbError::connection("I/O error: connection refused");
        assert_eq!(err.code(), GENERAL_ERROR_CODE);
        assert_eq!(err.info(), "HY000 I/O error: connection refused");
    }

    #[test]
    fn test_resolution_failed_keeps_adapter_error() {
        let err = DbError::ResolutionFailed {
            role: Role::Master,
            attempts: 3,
            code: Some("28000".to_string()),
            info: Some("28000 Access denied".to_string()),
        };
        assert_eq!(err.code(), "28000");
        assert_eq!(err.info(), "28000 Access denied");
        assert!(err.to_string().contains("3 attempt(s)"));
    }

    #[test]
    fn test_timeout_reports_elapsed_seconds() {
        let err = DbError::timeout("connect", 3);
        assert_eq!(err.info(), "HY000 Timeout: connect exceeded 3s");

        let err = DbError::from(sqlx::Error::PoolTimedOut);
        assert!(err.info().ends_with(&format!("exceeded {}s", DEFAULT_ACQUIRE_TIMEOUT_SECS)));
    }
}
