//! # GreenTree Core
//!
//! Pure primitives for the GreenTree ledger: tokens, chains, blocks and claims.
//!
//! This crate contains no I/O and no storage. It is pure computation over
//! cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`Token`] - A passphrase-protected identity owning one [`Chain`]
//! - [`Block`] - A signed, hash-linked entry with a sealed payload
//! - [`PendingBlock`] - A block under construction, open for claims
//! - [`Claim`] - A time-bounded read grant for one block
//!
//! ## Access
//!
//! Payloads are encrypted under a per-block content key. The key is wrapped
//! for the issuer and for every claim's grantee, so [`Block::data_for`] only
//! succeeds for a requester holding both a matching claim and the
//! passphrase proof that opens their own private keys.

pub mod block;
pub mod canonical;
pub mod chain;
pub mod claim;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod secret;
pub mod token;
pub mod types;

pub use block::{Block, Link, PendingBlock, BLOCK_VERSION};
pub use chain::Chain;
pub use claim::{Claim, ClaimWindow, Grantee};
pub use crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, X25519PublicKey};
pub use envelope::{EncryptedPayload, KeyShare};
pub use error::{CoreError, Result, ValidationError};
pub use secret::{AuthProof, KdfParams, Passphrase};
pub use token::Token;
pub use types::{now_millis, BlockHash, Timestamp};
