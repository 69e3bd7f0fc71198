//! Error types for the store module.

use greentree_core::{Ed25519PublicKey, ValidationError};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Token encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No token is stored under this key.
    #[error("token not found: {0}")]
    NotFound(Ed25519PublicKey),

    /// The token offered for commit does not validate.
    #[error("refusing to store invalid token: {0}")]
    InvalidToken(ValidationError),

    /// The offered chain does not extend the stored one.
    #[error("conflict for token {key}: {reason}")]
    Conflict {
        key: Ed25519PublicKey,
        reason: String,
    },

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking store task panicked or was cancelled.
    #[error("store task failed: {0}")]
    Task(String),

    /// A lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        StoreError::Task(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
