//! Error types for StrataDb storage engine.

use std::io;

use thiserror::Error;

/// The result type used throughout StrataDb.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for StrataDb operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A table failed validation or a record could not be decoded.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// The requested directory or file was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The database is in an invalid state (e.g. already closed).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The database directory already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Returns `true` if this error reports a corrupted table.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }
}
