//! # Database Error Types
//!
//! Error types for table store operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  ValidationError (planwise-core)    sqlx::Error / MigrateError         │
//! │       │                                   │                             │
//! │       └──────────────┬────────────────────┘                             │
//! │                      ▼                                                  │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  UI shell shows field errors / "not found" / retry                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every error leaves stored state as it was before the call.

use chrono::{DateTime, Utc};
use planwise_core::ValidationError;
use thiserror::Error;

/// Table store errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// No live record with this id.
    ///
    /// ## When This Occurs
    /// - Id was never saved in this table
    /// - Record is a tombstone
    #[error("{table} not found: {id}")]
    NotFound { table: String, id: String },

    /// Input rejected by the record schema. Nothing was written.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Input carries an `updatedAt` older than the stored version.
    ///
    /// ## When This Occurs
    /// - A form was opened, the record changed elsewhere, then the stale
    ///   form was submitted
    #[error("stale write to {id}: stored version {stored} is newer than {provided}")]
    StaleWrite {
        id: String,
        stored: DateTime<Utc>,
        provided: DateTime<Utc>,
    },

    /// A stored payload or backup document could not be decoded.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file can't be created
    /// - File permissions issue
    /// - Disk full
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given table and id.
    pub fn not_found(table: impl ToString, id: impl Into<String>) -> Self {
        DbError::NotFound {
            table: table.to_string(),
            id: id.into(),
        }
    }

    /// Returns true for errors caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DbError::NotFound { .. } | DbError::Validation(_) | DbError::StaleWrite { .. }
        )
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::Database       → DbError::QueryFailed
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// sqlx::Error::PoolClosed     → DbError::ConnectionFailed
/// Other                       → DbError::Internal
/// ```
///
/// Lookups use `fetch_optional`, so `RowNotFound` never stands in for a
/// missing record and lands in `Internal` like any other surprise.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => DbError::QueryFailed(db_err.message().to_string()),

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;
    use planwise_core::{FieldViolation, TableName};

    #[test]
    fn test_not_found_message() {
        let err = DbError::not_found(TableName::Plan, "abc");
        assert_eq!(err.to_string(), "plan not found: abc");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_validation_is_transparent() {
        let err: DbError = ValidationError::new(
            TableName::Person,
            vec![FieldViolation::Required { field: "id".into() }],
        )
        .into();
        assert_eq!(err.to_string(), "invalid person record: id is required");
    }

    #[test]
    fn test_pool_errors_are_not_client_errors() {
        let err: DbError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, DbError::PoolExhausted));
        assert!(!err.is_client_error());
    }
}
