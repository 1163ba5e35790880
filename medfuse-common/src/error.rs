//! Common error types for medfuse

use thiserror::Error;
use uuid::Uuid;

/// Common result type for medfuse operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across medfuse crates
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown case id (the only caller-visible failure of the live engine)
    #[error("Case not found: {0}")]
    CaseNotFound(Uuid),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
