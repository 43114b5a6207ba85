//! # AppError
//!
//! Centralized error handling for the echo-board crates.
//! Maps validation, remote and decoding failures to actionable error types.

use thiserror::Error;

/// The primary error type for all echo-board operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Input violates a field rule. Always raised before any remote effect.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found on the remote side (e.g. repository, record)
    #[error("{0} not found: {1}")]
    NotFound(String, String),

    /// Not logged in, or the remote rejected our credentials
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limit, server-side error status or transport failure
    #[error("transient remote error: {0}")]
    TransientRemote(String),

    /// Any other remote failure
    #[error("remote error: {0}")]
    Remote(String),

    /// Malformed route token or record payload
    #[error("decode error: {0}")]
    Decode(String),

    /// Session persistence failure
    #[error("storage error: {0}")]
    Storage(String),
}

impl AppError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::TransientRemote(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Decode(err.to_string())
    }
}

/// A specialized Result type for echo-board logic.
pub type Result<T> = std::result::Result<T, AppError>;
