//! Chains: the ordered, hash-linked blocks owned by one token.

use serde::{Deserialize, Serialize};

use crate::block::{Block, Link};
use crate::crypto::Ed25519PublicKey;
use crate::error::{CoreError, Result, ValidationError};

/// An append-only sequence of blocks issued by `owner`.
///
/// The first block is ROOT-linked and every later block links to the hash of
/// the block before it. [`Chain::append`] is the only mutation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chain {
    owner: Ed25519PublicKey,
    blocks: Vec<Block>,
}

impl Chain {
    /// An empty chain for `owner`.
    pub fn new(owner: Ed25519PublicKey) -> Self {
        Self {
            owner,
            blocks: Vec::new(),
        }
    }

    pub fn owner(&self) -> &Ed25519PublicKey {
        &self.owner
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The most recently appended block.
    pub fn head(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn get(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    /// Blocks in append order.
    pub fn blocks(&self) -> std::slice::Iter<'_, Block> {
        self.blocks.iter()
    }

    /// The link the next block must carry.
    pub fn next_link(&self) -> Link {
        match self.head() {
            None => Link::Root,
            Some(head) => Link::Chained(head.hash()),
        }
    }

    /// Append `block`, leaving the chain untouched on any error.
    ///
    /// Fails with [`CoreError::ChainLinkBroken`] unless the block links to
    /// the current head (or is ROOT on an empty chain).
    pub fn append(&mut self, block: Block) -> Result<()> {
        let expected = self.next_link();
        if *block.link() != expected {
            return Err(CoreError::ChainLinkBroken {
                expected,
                got: *block.link(),
            });
        }

        if *block.issuer() != self.owner {
            return Err(CoreError::ForeignIssuer {
                owner: self.owner,
                issuer: *block.issuer(),
            });
        }

        block.check()?;
        self.blocks.push(block);
        Ok(())
    }

    /// Walk every block, re-checking links, issuers and block integrity.
    pub fn verify(&self) -> std::result::Result<(), ValidationError> {
        if self.blocks.is_empty() {
            return Err(ValidationError::EmptyChain);
        }

        let mut expected = Link::Root;
        for (index, block) in self.blocks.iter().enumerate() {
            if *block.link() != expected {
                return Err(ValidationError::BrokenLink { index });
            }
            if *block.issuer() != self.owner {
                return Err(ValidationError::ForeignIssuer { index });
            }
            block.check().map_err(|source| ValidationError::InvalidBlock {
                index,
                source: Box::new(source),
            })?;
            expected = Link::Chained(block.hash());
        }

        Ok(())
    }

    pub fn validate(&self) -> bool {
        match self.verify() {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(owner = %self.owner, error = %e, "chain failed validation");
                false
            }
        }
    }

    /// Whether `self` starts with every block of `prefix`, unchanged.
    pub fn extends(&self, prefix: &Chain) -> bool {
        self.owner == prefix.owner
            && self.blocks.len() >= prefix.blocks.len()
            && self
                .blocks
                .iter()
                .zip(prefix.blocks.iter())
                .all(|(a, b)| a.hash() == b.hash() && a.signature() == b.signature())
    }
}

impl<'a> IntoIterator for &'a Chain {
    type Item = &'a Block;
    type IntoIter = std::slice::Iter<'a, Block>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}

#[cfg(test)]
impl Chain {
    pub(crate) fn blocks_mut(&mut self) -> &mut [Block] {
        &mut self.blocks
    }
}
