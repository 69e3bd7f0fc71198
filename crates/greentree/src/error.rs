//! Error types for the ledger façade.

use greentree_access::AccessError;
use greentree_core::CoreError;
use greentree_store::StoreError;
use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Access error.
    #[error("access error: {0}")]
    Access(#[from] AccessError),

    /// The session has no authenticated token.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The session has logged out.
    #[error("session closed")]
    SessionClosed,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    /// Whether a passphrase proof was rejected.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            LedgerError::Core(CoreError::Unauthorized) => true,
            LedgerError::Access(e) => e.is_unauthorized(),
            _ => false,
        }
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
