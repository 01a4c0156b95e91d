//! Database error types
//!
//! Errors raised by the repositories, and their translation into the
//! `PortError` the domain understands.

use core_kernel::PortError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// Unique index violation (SQLSTATE 23505)
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Foreign key or check constraint violation
    #[error("Constraint {} violated: {message}", constraint.as_deref().unwrap_or("?"))]
    ConstraintViolation {
        constraint: Option<String>,
        message: String,
    },

    /// A guarded write matched no row because the stored row moved on
    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be decoded into its domain type
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,
}

impl DatabaseError {
    /// ```rust
    /// use infra_db::DatabaseError;
    ///
    /// let error = DatabaseError::not_found("PaymentOrder", "order_IluGWxBm9U8zJ8");
    /// assert_eq!(error.to_string(), "PaymentOrder 'order_IluGWxBm9U8zJ8' not found");
    /// ```
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        DatabaseError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        DatabaseError::Conflict(message.into())
    }

    pub fn serialization(message: impl std::fmt::Display) -> Self {
        DatabaseError::SerializationError(message.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound { .. })
    }
}

/// Classifies by SQLSTATE
///
/// <https://www.postgresql.org/docs/current/errcodes-appendix.html>
impl From<&sqlx::Error> for DatabaseError {
    fn from(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => DatabaseError::NotFound {
                entity: "Record",
                id: "unknown".to_string(),
            },
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::Io(e) => DatabaseError::ConnectionFailed(e.to_string()),
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.code().as_deref() {
                    Some("23505") => DatabaseError::DuplicateEntry(message),
                    Some("23503") | Some("23514") => DatabaseError::ConstraintViolation {
                        constraint: db_err.constraint().map(str::to_string),
                        message,
                    },
                    // serialization_failure, deadlock_detected
                    Some("40001") | Some("40P01") => DatabaseError::Conflict(message),
                    _ => DatabaseError::QueryFailed(message),
                }
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DatabaseError::SerializationError(error.to_string())
            }
            _ => DatabaseError::QueryFailed(error.to_string()),
        }
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        DatabaseError::from(&error)
    }
}

/// Connection trouble stays transient so the caller may retry it; a
/// duplicate key is a conflict like a stale version.
impl From<DatabaseError> for PortError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::NotFound { entity, id } => PortError::not_found(entity, id),
            DatabaseError::Conflict(message) | DatabaseError::DuplicateEntry(message) => {
                PortError::conflict(message)
            }
            DatabaseError::ConnectionFailed(message) => PortError::connection(message),
            DatabaseError::PoolExhausted => PortError::unavailable("postgres"),
            DatabaseError::ConstraintViolation { constraint, message } => PortError::Validation {
                message,
                field: constraint,
            },
            other => PortError::internal(other.to_string()),
        }
    }
}
