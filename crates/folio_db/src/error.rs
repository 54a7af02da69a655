//! Error types for the Db layer.

use std::io;
use thiserror::Error;

/// Result type for Db operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur in Db operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// I/O error from the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Another process holds the database lock.
    #[error("database locked: another process has exclusive access")]
    Locked,

    /// The on-disk log is corrupted or has an invalid format.
    #[error("log corruption: {message}")]
    Corrupt {
        /// Description of the corruption.
        message: String,
    },

    /// A database path was rejected by the factory.
    #[error("invalid database path: {message}")]
    InvalidPath {
        /// Description of why the path is invalid.
        message: String,
    },
}

impl DbError {
    /// Creates a log corruption error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }

    /// Creates an invalid path error.
    pub fn invalid_path(message: impl Into<String>) -> Self {
        Self::InvalidPath {
            message: message.into(),
        }
    }
}
