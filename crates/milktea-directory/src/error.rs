//! Error types for the instance directory.
//!
//! Two layers are defined here:
//! - [`StoreError`] is what a store backend reports. Constraint failures are
//!   classified into their own variants so callers can react to them.
//! - [`DirectoryError`] is what the registries report to their callers.

use rusqlite::ffi;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No matching row")]
    NotFound,

    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("Foreign key constraint violated: {message}")]
    ForeignKeyViolation { message: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("Stored value for {column} could not be decoded: {message}")]
    Corrupt { column: String, message: String },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        let constraint = match &err {
            rusqlite::Error::QueryReturnedNoRows => return StoreError::NotFound,
            rusqlite::Error::SqliteFailure(failure, message)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Some((
                    failure.extended_code,
                    message.clone().unwrap_or_else(|| err.to_string()),
                ))
            }
            _ => None,
        };

        match constraint {
            Some((ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY, message)) => {
                StoreError::UniqueViolation {
                    constraint: message
                        .strip_prefix("UNIQUE constraint failed: ")
                        .unwrap_or(&message)
                        .to_string(),
                }
            }
            Some((ffi::SQLITE_CONSTRAINT_FOREIGNKEY, message)) => {
                StoreError::ForeignKeyViolation { message }
            }
            Some((_, message)) => StoreError::Database {
                message,
                source: Some(err),
            },
            None => StoreError::Database {
                message: err.to_string(),
                source: Some(err),
            },
        }
    }
}

/// Errors reported by the instance and subscription registries.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("{entity} conflict: {message}")]
    Conflict {
        entity: &'static str,
        message: String,
    },

    #[error("Validation error for {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("Storage failure: {source}")]
    Storage {
        #[from]
        source: StoreError,
    },
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, DirectoryError>;

impl DirectoryError {
    pub(crate) fn not_found(entity: &'static str, key: impl ToString) -> Self {
        DirectoryError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub(crate) fn empty_field(field: &'static str) -> Self {
        DirectoryError::Validation {
            field,
            message: "must not be empty".to_string(),
        }
    }

    /// `true` for lookups that matched nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DirectoryError::NotFound { .. })
    }

    /// `true` when a uniqueness rule rejected the operation.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DirectoryError::Conflict { .. })
    }
}
