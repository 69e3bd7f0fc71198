//! # GreenTree Store
//!
//! Token persistence for the GreenTree ledger. Provides a trait-based
//! interface with in-memory, file and SQLite implementations.
//!
//! ## Key Types
//!
//! - [`TokenStore`] - The async trait for all storage operations
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`FileStore`] - One CBOR file per token in a directory
//! - [`SqliteStore`] - SQLite-based persistent storage
//!
//! ## Usage
//!
//! ```rust,no_run
//! use greentree_core::{Passphrase, Token};
//! use greentree_store::{SqliteStore, TokenStore};
//!
//! async fn example() {
//!     let store = SqliteStore::open("tokens.db").unwrap();
//!
//!     let token = Token::create(&Passphrase::from("correct horse")).unwrap();
//!     store.commit(&token).await.unwrap();
//!
//!     let loaded = store.select(&token.public_key()).await.unwrap();
//!     assert_eq!(loaded, token);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Snapshots**: a commit replaces the whole stored token atomically
//! - **Append-only**: a commit that truncates or forks the stored chain is a `Conflict`
//! - **Validated writes**: tokens that fail validation are never stored

pub mod error;
pub mod file;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use sqlite::{BlockRecord, SqliteStore};
pub use traits::{admit, TokenStore};
