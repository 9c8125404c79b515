//! Error types for storage and domain operations.

use thiserror::Error;

/// Convenience alias used throughout the storage layer.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors produced by the core domain and storage layer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Requested entity does not exist.
    #[error("entity not found")]
    NotFound,

    /// A database constraint rejected the write.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Input failed domain validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    /// Returns true when the error is a missing-entity lookup.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Returns true when a unique, foreign key or check constraint fired.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation(_))
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation()
                    || db_err.is_foreign_key_violation()
                    || db_err.is_check_violation()
                {
                    Self::ConstraintViolation(db_err.to_string())
                } else {
                    Self::Database(db_err.to_string())
                }
            }
            other => Self::Database(other.to_string()),
        }
    }
}
