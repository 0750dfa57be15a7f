//! # Error Types
//!
//! `DbError` for storage failures and `ServiceError` for everything a
//! service operation can return.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  sqlx::Error ──classify──► DbError        CoreError (domain rule)       │
//! │                               │               │                         │
//! │                               └──────┬────────┘                         │
//! │                                      ▼                                  │
//! │                               ServiceError                              │
//! │                                      │                                  │
//! │             transaction dropped, ROLLBACK, then returned to the caller  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! SQLite reports constraint failures only as message text, so the
//! classification below matches on the message prefixes SQLite uses.

use storekeep_core::{CoreError, ValidationError};
use thiserror::Error;

const UNIQUE_PREFIX: &str = "UNIQUE constraint failed: ";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A UNIQUE index rejected the write. `constraint` is SQLite's column
    /// list, e.g. `till_closings.till_id, till_closings.business_date`.
    ///
    /// Raised for a duplicate SKU, a second closing for a till and date,
    /// or a second OPEN till for one user.
    #[error("Unique constraint violated on {constraint}")]
    UniqueViolation { constraint: String },

    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// CHECK constraint or trigger abort, e.g. a negative reserved
    /// quantity or an update to an append-only movement row.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// The write lock was still held by another transaction when
    /// `busy_timeout` ran out.
    #[error("Database busy: {0}")]
    Busy(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// No pooled connection became free within the acquire timeout.
    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// True when a UNIQUE index covering `column` (e.g.
    /// `till_closings.till_id`) rejected the write.
    pub fn is_unique_violation_on(&self, column: &str) -> bool {
        matches!(self, DbError::UniqueViolation { constraint } if constraint.contains(column))
    }

    /// Maps an SQLite error message onto a category.
    fn classify(message: &str) -> Self {
        if let Some(columns) = message.strip_prefix(UNIQUE_PREFIX) {
            DbError::UniqueViolation {
                constraint: columns.to_string(),
            }
        } else if message.contains("FOREIGN KEY constraint failed") {
            DbError::ForeignKeyViolation(message.to_string())
        } else if message.contains("CHECK constraint failed") || message.contains("append-only") {
            DbError::ConstraintViolation(message.to_string())
        } else if message.contains("database is locked") || message.contains("database is busy") {
            DbError::Busy(message.to_string())
        } else {
            DbError::QueryFailed(message.to_string())
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),
            sqlx::Error::Database(db_err) => DbError::classify(db_err.message()),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Service Error
// =============================================================================

/// Error returned by `InventoryLedger`, `TillManager` and `SaleOrchestrator`.
///
/// Domain failures are recoverable by the caller; nothing here is retried.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] CoreError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::Db(err.into())
    }
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::Domain(err.into())
    }
}

impl ServiceError {
    /// The domain error, if this is one.
    pub fn domain(&self) -> Option<&CoreError> {
        match self {
            ServiceError::Domain(err) => Some(err),
            ServiceError::Db(_) => None,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
