//! Blocks: the hash-linked entries of a chain.
//!
//! A block is built as a [`PendingBlock`], which may take claims, and then
//! frozen into a signed, immutable [`Block`] by [`PendingBlock::commit`].
//!
//! ## Integrity
//!
//! The block hash covers the canonical header: version, issuer, predecessor
//! hash (null for ROOT), timestamp, payload tag, and digests of the sealed
//! payload and the issuer's key share. Claims are not part of the hash; the
//! issuer's signature covers `hash || canonical(claims)`.
//!
//! ## Equality
//!
//! Two blocks are equal when their payload tag, link type and issuer match.
//! The timestamp and therefore the hash are ignored.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::canonical::{encode_array, header_keys, MapEncoder};
use crate::claim::Claim;
use crate::crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, EncryptionKey};
use crate::envelope::{EncryptedPayload, KeyShare};
use crate::error::{CoreError, Result, ValidationError};
use crate::secret::AuthProof;
use crate::token::{Token, UnlockedKeys};
use crate::types::{BlockHash, Timestamp};

/// Current block format version.
pub const BLOCK_VERSION: u8 = 0;

const HASH_CONTEXT: &str = "greentree-v0 block hash";

/// How a block attaches to its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Link {
    /// First block of a chain.
    Root,
    /// Links to the hash of the preceding block.
    Chained(BlockHash),
}

impl Link {
    pub fn is_root(&self) -> bool {
        matches!(self, Link::Root)
    }

    pub fn predecessor(&self) -> Option<&BlockHash> {
        match self {
            Link::Root => None,
            Link::Chained(hash) => Some(hash),
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Link::Root => f.write_str("ROOT"),
            Link::Chained(hash) => write!(f, "{}", hash),
        }
    }
}

/// A committed, signed chain entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    version: u8,
    issuer: Ed25519PublicKey,
    link: Link,
    timestamp: Timestamp,
    payload_tag: Blake3Hash,
    payload: EncryptedPayload,
    owner_share: KeyShare,
    claims: Vec<Claim>,
    hash: BlockHash,
    signature: Ed25519Signature,
}

impl Block {
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn issuer(&self) -> &Ed25519PublicKey {
        &self.issuer
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    pub fn is_root(&self) -> bool {
        self.link.is_root()
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Keyed digest of the plaintext payload, unique per issuer and payload.
    pub fn payload_tag(&self) -> &Blake3Hash {
        &self.payload_tag
    }

    /// Claims in insertion order.
    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    /// The stored hash.
    pub fn hash(&self) -> BlockHash {
        self.hash
    }

    pub fn signature(&self) -> &Ed25519Signature {
        &self.signature
    }

    /// Recompute the hash from the block's header fields.
    pub fn compute_hash(&self) -> BlockHash {
        header_hash(
            self.version,
            &self.issuer,
            &self.link,
            self.timestamp,
            &self.payload_tag,
            &self.payload,
            &self.owner_share,
        )
    }

    /// Check hash, signature and claims, reporting the first failure.
    pub fn check(&self) -> std::result::Result<(), ValidationError> {
        if self.version != BLOCK_VERSION {
            return Err(ValidationError::UnsupportedVersion(self.version));
        }

        let computed = self.compute_hash();
        if computed != self.hash {
            return Err(ValidationError::HashMismatch {
                stored: self.hash,
                computed,
            });
        }

        self.issuer
            .verify(&signed_message(&self.hash, &self.claims), &self.signature)
            .map_err(|_| ValidationError::SignatureFailed)?;

        for (index, claim) in self.claims.iter().enumerate() {
            if !claim.window().is_well_formed() {
                return Err(ValidationError::InvalidClaimWindow { index });
            }
            if !claim.is_attached() {
                return Err(ValidationError::MissingKeyShare { index });
            }
        }

        Ok(())
    }

    pub fn validate(&self) -> bool {
        self.check().is_ok()
    }

    /// The plaintext payload, if `requester` may read it at `now`.
    ///
    /// Readable by the issuer, or by a requester named in an attached claim
    /// that is valid at `now`. The proof must verify against the requester.
    /// Denial is `None`, never an error.
    pub fn data_for(&self, requester: &Token, proof: &AuthProof, now: Timestamp) -> Option<Bytes> {
        self.data_for_with(requester, proof, now, None)
    }

    /// Like [`Block::data_for`], with the issuer's own access governed by
    /// `implicit`, an unattached self-claim.
    ///
    /// When the claim names the issuer, the issuer reads only while the claim
    /// is valid at `now`. A claim naming anyone else is ignored: it carries no
    /// key share.
    pub fn data_for_with(
        &self,
        requester: &Token,
        proof: &AuthProof,
        now: Timestamp,
        implicit: Option<&Claim>,
    ) -> Option<Bytes> {
        let requester_key = requester.public_key();
        let keys = match requester.unlock(proof) {
            Ok(keys) => keys,
            Err(e) => {
                tracing::debug!(requester = %requester_key, error = %e, "cannot unlock requester");
                return None;
            }
        };

        let share = if requester_key == self.issuer {
            match implicit.filter(|claim| claim.names(&requester_key)) {
                Some(claim) if !claim.is_valid_at(now) => None,
                _ => Some(&self.owner_share),
            }
        } else {
            self.claims
                .iter()
                .filter(|claim| claim.names(&requester_key) && claim.is_valid_at(now))
                .find_map(Claim::share)
        }?;

        let context = share_context(&self.issuer, &self.payload_tag);
        let opened = share
            .open(keys.exchange(), &context)
            .and_then(|content_key| self.payload.decrypt(&content_key));

        match opened {
            Ok(plaintext) => Some(Bytes::from(plaintext)),
            Err(e) => {
                tracing::debug!(block = %self.hash, error = %e, "payload did not open");
                None
            }
        }
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.payload_tag == other.payload_tag
            && self.link.is_root() == other.link.is_root()
            && self.issuer == other.issuer
    }
}

impl Eq for Block {}

impl Hash for Block {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Hash::hash(&self.payload_tag, state);
        self.link.is_root().hash(state);
        self.issuer.hash(state);
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Block[hash={}, issuer={}, referee={}, timestamp={}, claims=[",
            self.hash, self.issuer, self.link, self.timestamp
        )?;
        for (i, claim) in self.claims.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", claim)?;
        }
        f.write_str("]]")
    }
}

/// An uncommitted block. Claims can only be added at this stage.
pub struct PendingBlock {
    keys: UnlockedKeys,
    verifier: Blake3Hash,
    link: Link,
    timestamp: Timestamp,
    payload_tag: Blake3Hash,
    payload: EncryptedPayload,
    owner_share: KeyShare,
    content_key: EncryptionKey,
    claims: Vec<Claim>,
}

impl PendingBlock {
    /// Start the first block of `issuer`'s chain.
    pub fn root(
        issuer: &Token,
        proof: &AuthProof,
        payload: &[u8],
        now: Timestamp,
    ) -> Result<Self> {
        Self::build(issuer, proof, Link::Root, payload, now)
    }

    /// Start a block following `predecessor`.
    pub fn chained(
        issuer: &Token,
        proof: &AuthProof,
        payload: &[u8],
        predecessor: &Block,
        now: Timestamp,
    ) -> Result<Self> {
        Self::build(issuer, proof, Link::Chained(predecessor.hash()), payload, now)
    }

    fn build(
        issuer: &Token,
        proof: &AuthProof,
        link: Link,
        payload: &[u8],
        now: Timestamp,
    ) -> Result<Self> {
        let keys = issuer.unlock(proof)?;
        let issuer_key = keys.public_key();

        let payload_tag = Blake3Hash(*blake3::keyed_hash(&keys.payload_tag_key(), payload).as_bytes());
        let content_key = EncryptionKey::generate();
        let sealed = EncryptedPayload::encrypt(payload, &content_key)?;
        let owner_share = KeyShare::wrap(
            &content_key,
            &issuer.exchange_key(),
            &share_context(&issuer_key, &payload_tag),
        )?;

        Ok(Self {
            keys,
            verifier: *issuer.verifier(),
            link,
            timestamp: now,
            payload_tag,
            payload: sealed,
            owner_share,
            content_key,
            claims: Vec::new(),
        })
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    /// Attach `claim`, wrapping the content key for its grantee.
    ///
    /// Fails with [`CoreError::Unauthorized`] unless `proof` verifies against
    /// the issuer.
    pub fn add_claim(&mut self, claim: Claim, proof: &AuthProof) -> Result<()> {
        if !proof.verifier().ct_eq(&self.verifier) {
            return Err(CoreError::Unauthorized);
        }

        let context = share_context(&self.keys.public_key(), &self.payload_tag);
        let share = KeyShare::wrap(&self.content_key, &claim.grantee().exchange, &context)?;
        self.claims.push(claim.attach(share));
        Ok(())
    }

    /// Hash, sign and freeze the block.
    pub fn commit(self) -> Block {
        let issuer = self.keys.public_key();
        let hash = header_hash(
            BLOCK_VERSION,
            &issuer,
            &self.link,
            self.timestamp,
            &self.payload_tag,
            &self.payload,
            &self.owner_share,
        );
        let signature = self.keys.signing().sign(&signed_message(&hash, &self.claims));

        Block {
            version: BLOCK_VERSION,
            issuer,
            link: self.link,
            timestamp: self.timestamp,
            payload_tag: self.payload_tag,
            payload: self.payload,
            owner_share: self.owner_share,
            claims: self.claims,
            hash,
            signature,
        }
    }
}

impl fmt::Debug for PendingBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingBlock")
            .field("issuer", &self.keys.public_key())
            .field("link", &self.link)
            .field("timestamp", &self.timestamp)
            .field("claims", &self.claims.len())
            .finish()
    }
}

fn header_hash(
    version: u8,
    issuer: &Ed25519PublicKey,
    link: &Link,
    timestamp: Timestamp,
    payload_tag: &Blake3Hash,
    payload: &EncryptedPayload,
    owner_share: &KeyShare,
) -> BlockHash {
    let header = MapEncoder::new()
        .uint(header_keys::VERSION, version as u64)
        .bytes(header_keys::ISSUER, issuer.as_bytes())
        .optional_bytes(
            header_keys::PREV_HASH,
            link.predecessor().map(|h| h.as_bytes().as_slice()),
        )
        .int(header_keys::TIMESTAMP, timestamp)
        .bytes(header_keys::PAYLOAD_TAG, payload_tag.as_bytes())
        .bytes(header_keys::PAYLOAD_DIGEST, payload.digest().as_bytes())
        .bytes(header_keys::OWNER_SHARE_DIGEST, owner_share.digest().as_bytes())
        .finish();

    let mut hasher = blake3::Hasher::new_derive_key(HASH_CONTEXT);
    hasher.update(&header);
    BlockHash(*hasher.finalize().as_bytes())
}

fn signed_message(hash: &BlockHash, claims: &[Claim]) -> Vec<u8> {
    let encoded: Vec<Vec<u8>> = claims.iter().map(Claim::canonical_bytes).collect();
    let mut message = hash.as_bytes().to_vec();
    message.extend_from_slice(&encode_array(&encoded));
    message
}

/// Binds key shares to the block they open.
fn share_context(issuer: &Ed25519PublicKey, payload_tag: &Blake3Hash) -> Vec<u8> {
    let mut context = Vec::with_capacity(64);
    context.extend_from_slice(issuer.as_bytes());
    context.extend_from_slice(payload_tag.as_bytes());
    context
}

#[cfg(test)]
impl Block {
    pub(crate) fn tamper_payload(&mut self) {
        if let Some(byte) = self.payload.ciphertext.first_mut() {
            *byte ^= 0x01;
        }
    }

    pub(crate) fn tamper_link(&mut self, link: Link) {
        self.link = link;
    }

    pub(crate) fn tamper_claim_window(&mut self, not_after: Timestamp) {
        if let Some(claim) = self.claims.first_mut() {
            *claim = claim.clone().with_window_unchecked(not_after);
        }
    }
}
