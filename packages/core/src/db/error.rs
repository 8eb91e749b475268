//! Database Error Types
//!
//! This module defines error types for store operations, providing
//! clear error handling for connection, initialization, and query failures.

use crate::config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// Store operation errors
///
/// Covers connection, schema setup and statement failures. Unique-constraint
/// violations are reported separately so callers can turn an insert race into
/// a lookup.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish database connection
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to initialize database schema
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// Table naming rejected at setup
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    /// Permission denied when accessing database
    #[error("Permission denied for database path: {path}")]
    PermissionDenied { path: PathBuf },

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// A row conflicts with a unique index
    #[error("Unique constraint violated: {context}")]
    UniqueViolation { context: String },

    /// A stored row could not be converted into a node
    #[error("Failed to decode row: {context}")]
    RowDecodeFailed { context: String },

    /// Transaction could not be started, committed or rolled back
    #[error("Transaction failed: {context}")]
    TransactionFailed { context: String },
}

impl DatabaseError {
    /// Create a connection failed error
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a permission denied error
    pub fn permission_denied(path: PathBuf) -> Self {
        Self::PermissionDenied { path }
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    /// Create a row decode error
    pub fn row_decode(context: impl Into<String>) -> Self {
        Self::RowDecodeFailed {
            context: context.into(),
        }
    }

    /// Create a transaction error
    pub fn transaction_failed(context: impl Into<String>) -> Self {
        Self::TransactionFailed {
            context: context.into(),
        }
    }

    /// Classify a failed statement, separating unique-index conflicts
    pub fn from_statement(context: &str, source: libsql::Error) -> Self {
        let message = source.to_string();
        if message.contains("UNIQUE constraint failed") {
            Self::UniqueViolation {
                context: format!("{}: {}", context, message),
            }
        } else {
            Self::sql_execution(format!("{}: {}", context, message))
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }
}
