//! # GreenTree Testkit
//!
//! Testing utilities for the GreenTree ledger.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a memory store and access gate with parties already
//!   registered, using minimum-cost KDF parameters
//! - **Generators**: Proptest strategies for payloads, windows and whole
//!   chains
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use greentree_testkit::TestFixture;
//!
//! # async fn example() {
//! let fixture = TestFixture::new();
//! let mut alice = fixture.party("alice").await;
//! let bob = fixture.party("bob").await;
//!
//! fixture.grant(&mut alice, b"for bob", &bob).await;
//! assert_eq!(fixture.read(&bob, &alice).await.len(), 1);
//! # }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use greentree_testkit::generators::{chain_from_params, ChainParams};
//!
//! proptest! {
//!     #[test]
//!     fn built_chains_validate(params: ChainParams) {
//!         let (token, _) = chain_from_params(&params).unwrap();
//!         prop_assert!(token.validate());
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{Party, TestFixture};
pub use generators::{chain_from_params, ChainParams};
