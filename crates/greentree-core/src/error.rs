//! Error types for the GreenTree core.

use thiserror::Error;

use crate::block::Link;
use crate::crypto::Ed25519PublicKey;
use crate::types::{BlockHash, Timestamp};

/// Errors raised by identity, block and chain operations.
///
/// Every mutating operation that returns one of these leaves its target
/// unchanged.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Key generation, key derivation or an AEAD operation failed.
    #[error("cryptographic failure: {0}")]
    CryptoFailure(String),

    /// The authentication proof does not verify against the identity.
    #[error("unauthorized: authentication proof did not verify")]
    Unauthorized,

    #[error("invalid claim window: not_before {not_before} must precede not_after {not_after}")]
    InvalidWindow {
        not_before: Timestamp,
        not_after: Timestamp,
    },

    /// The block does not link to the current chain head.
    #[error("chain link broken: expected {expected}, got {got}")]
    ChainLinkBroken { expected: Link, got: Link },

    #[error("block issued by {issuer} cannot join the chain of {owner}")]
    ForeignIssuer {
        owner: Ed25519PublicKey,
        issuer: Ed25519PublicKey,
    },

    #[error("invalid block: {0}")]
    InvalidBlock(#[from] ValidationError),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("decoding error: {0}")]
    Decoding(String),
}

/// Diagnostics for block, chain and identity validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unsupported block version: {0}")]
    UnsupportedVersion(u8),

    #[error("block hash mismatch: stored {stored}, computed {computed}")]
    HashMismatch {
        stored: BlockHash,
        computed: BlockHash,
    },

    #[error("signature verification failed")]
    SignatureFailed,

    #[error("claim {index} has an empty validity window")]
    InvalidClaimWindow { index: usize },

    #[error("claim {index} carries no key share")]
    MissingKeyShare { index: usize },

    #[error("chain is empty")]
    EmptyChain,

    #[error("block {index} does not link to its predecessor")]
    BrokenLink { index: usize },

    #[error("block {index} was not issued by the chain owner")]
    ForeignIssuer { index: usize },

    #[error("block {index} failed validation: {source}")]
    InvalidBlock {
        index: usize,
        #[source]
        source: Box<ValidationError>,
    },

    #[error("identity has no key material")]
    UnkeyedIdentity,

    #[error("identity key is not a valid Ed25519 point")]
    MalformedIdentityKey,

    #[error("chain owner does not match identity")]
    OwnerMismatch,
}

impl ValidationError {
    /// Index of the failing block, when the error concerns one.
    pub fn block_index(&self) -> Option<usize> {
        match self {
            ValidationError::BrokenLink { index }
            | ValidationError::ForeignIssuer { index }
            | ValidationError::InvalidBlock { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
