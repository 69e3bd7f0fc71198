//! Error types for the access module.

use greentree_core::{CoreError, Ed25519PublicKey};
use greentree_store::StoreError;
use thiserror::Error;

/// Errors that can occur during gated reads and chain extension.
///
/// Being denied a block's payload is not an error; such blocks are simply
/// left out of a read.
#[derive(Debug, Error)]
pub enum AccessError {
    /// Core error (bad proof, bad window, broken link).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The store has no token under this key.
    #[error("identity not found: {0}")]
    IdentityNotFound(Ed25519PublicKey),

    /// The store failed to load or save a token.
    #[error("persistence error: {0}")]
    Persistence(StoreError),

    /// Implicit self-claims need a positive lifetime.
    #[error("self-claim ttl must be positive, got {0} ms")]
    InvalidSelfClaimTtl(i64),
}

impl AccessError {
    /// Whether the caller's proof was rejected.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AccessError::Core(CoreError::Unauthorized))
    }
}

impl From<StoreError> for AccessError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(key) => AccessError::IdentityNotFound(key),
            other => AccessError::Persistence(other),
        }
    }
}

/// Result type for access operations.
pub type Result<T> = std::result::Result<T, AccessError>;
