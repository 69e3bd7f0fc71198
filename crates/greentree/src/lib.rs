//! # GreenTree
//!
//! A ledger of passphrase-protected identities. Each identity (a [`Token`])
//! owns an append-only, hash-linked chain of encrypted entries, and decides
//! entry by entry who else may read them through time-windowed claims.
//!
//! ## Overview
//!
//! - **Tokens**: Ed25519 identities whose private keys are sealed under a
//!   passphrase-derived key
//! - **Blocks**: signed chain entries carrying an encrypted payload and claims
//! - **Claims**: grants letting a named token read one block during
//!   `[not_before, not_after)`
//! - **Sessions**: register, authenticate, read, extend and log out
//!
//! ## Usage
//!
//! ```rust,no_run
//! use greentree::{LedgerConfig, Passphrase, Session};
//!
//! async fn example() {
//!     let config = LedgerConfig::load("greentree.toml").unwrap();
//!
//!     let mut alice = Session::from_config(&config).unwrap();
//!     let alice_key = alice.register(&Passphrase::from("alice secret")).await.unwrap();
//!
//!     let mut bob = Session::from_config(&config).unwrap();
//!     let bob_key = bob.register(&Passphrase::from("bob secret")).await.unwrap();
//!
//!     // Let Bob read one entry for the next hour.
//!     let now = greentree::core::now_millis();
//!     alice
//!         .grant(b"for bob", &bob_key, now, now + 3_600_000)
//!         .await
//!         .unwrap();
//!
//!     let visible = bob.read(&alice_key).await.unwrap();
//!     assert_eq!(visible.len(), 1);
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `greentree::core` - Tokens, blocks, claims and chains
//! - `greentree::store` - Token stores
//! - `greentree::access` - The access gate

pub mod config;
pub mod error;
pub mod session;

// Re-export component crates
pub use greentree_access as access;
pub use greentree_core as core;
pub use greentree_store as store;

// Re-export main types for convenience
pub use config::{LedgerConfig, StoreConfig};
pub use error::{LedgerError, Result};
pub use session::{Session, SessionStatus};

// Re-export commonly used component types
pub use greentree_access::{AccessError, AccessGate};
pub use greentree_core::{
    AuthProof, Block, Chain, Claim, ClaimWindow, CoreError, Ed25519PublicKey, KdfParams,
    Passphrase, Token,
};
pub use greentree_store::{FileStore, MemoryStore, SqliteStore, StoreError, TokenStore};
