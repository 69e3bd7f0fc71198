//! TokenStore trait: the abstract interface for token persistence.
//!
//! The ledger is storage-agnostic. Implementations include an in-memory map
//! (tests), one file per token, and SQLite.

use async_trait::async_trait;
use greentree_core::{Ed25519PublicKey, Token};

use crate::error::{Result, StoreError};

/// Async interface for token persistence, keyed by public key.
///
/// A commit replaces the stored snapshot of a token as a whole. Backends must
/// make that replacement atomic: a reader sees either the old snapshot or the
/// new one.
///
/// # Admission
///
/// Every backend runs [`admit`] before writing: the token must validate, and
/// its chain must extend the stored chain. Chains only grow.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Durably save `token` under its public key.
    async fn commit(&self, token: &Token) -> Result<()>;

    /// Load the most recently committed snapshot of the token.
    ///
    /// Fails with [`StoreError::NotFound`] if nothing is stored under `key`.
    async fn select(&self, key: &Ed25519PublicKey) -> Result<Token>;

    /// Whether a token is stored under `key`.
    async fn contains(&self, key: &Ed25519PublicKey) -> Result<bool>;

    /// Keys of all stored tokens, sorted.
    async fn list(&self) -> Result<Vec<Ed25519PublicKey>>;
}

/// Decide whether `incoming` may replace `stored`.
///
/// Rejects tokens that fail validation with [`StoreError::InvalidToken`] and
/// chains that truncate or fork the stored chain with
/// [`StoreError::Conflict`]. Re-committing an unchanged token is allowed.
pub fn admit(stored: Option<&Token>, incoming: &Token) -> Result<()> {
    incoming.check().map_err(StoreError::InvalidToken)?;

    let Some(stored) = stored else {
        return Ok(());
    };

    if incoming.chain().extends(stored.chain()) {
        return Ok(());
    }

    let (have, offered) = (stored.chain().len(), incoming.chain().len());
    let reason = if offered < have {
        format!("chain would shrink from {} to {} blocks", have, offered)
    } else {
        "chain diverges from the stored chain".to_string()
    };
    Err(StoreError::Conflict {
        key: incoming.public_key(),
        reason,
    })
}
