//! In-memory implementation of the TokenStore trait.
//!
//! This is primarily for testing. It has the same admission rules as the
//! persistent backends but keeps everything in memory.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use greentree_core::{Ed25519PublicKey, Token};

use crate::error::{Result, StoreError};
use crate::traits::{admit, TokenStore};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryStore {
    tokens: RwLock<HashMap<Ed25519PublicKey, Token>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tokens.
    pub fn len(&self) -> usize {
        self.tokens.read().map(|tokens| tokens.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn commit(&self, token: &Token) -> Result<()> {
        let key = token.public_key();
        let mut tokens = self.tokens.write().map_err(|_| StoreError::Poisoned)?;

        admit(tokens.get(&key), token)?;
        tokens.insert(key, token.clone());

        tracing::debug!(token = %key, blocks = token.chain().len(), "committed token");
        Ok(())
    }

    async fn select(&self, key: &Ed25519PublicKey) -> Result<Token> {
        let tokens = self.tokens.read().map_err(|_| StoreError::Poisoned)?;
        tokens.get(key).cloned().ok_or(StoreError::NotFound(*key))
    }

    async fn contains(&self, key: &Ed25519PublicKey) -> Result<bool> {
        let tokens = self.tokens.read().map_err(|_| StoreError::Poisoned)?;
        Ok(tokens.contains_key(key))
    }

    async fn list(&self) -> Result<Vec<Ed25519PublicKey>> {
        let tokens = self.tokens.read().map_err(|_| StoreError::Poisoned)?;
        let mut keys: Vec<_> = tokens.keys().copied().collect();
        keys.sort();
        Ok(keys)
    }
}
