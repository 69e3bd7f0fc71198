//! # GreenTree Access
//!
//! The access gate: decides, per block, whether a requester may see the
//! payload, and extends chains with new blocks and claims.
//!
//! ## Visibility
//!
//! A requester sees a block's payload when it issued the block or when an
//! attached claim names it and is valid at the time of the read. Reading your
//! own chain mints an implicit self-claim for the duration of the read; it is
//! never attached to a block and never stored.
//!
//! ## Extension
//!
//! [`AccessGate::append`] and [`AccessGate::grant`] build the new block on a
//! copy of the caller's token, commit the copy, and only then hand it back.
//! A failed commit leaves the caller's token as it was.

pub mod error;
pub mod gate;

pub use error::{AccessError, Result};
pub use gate::{reveal, AccessGate, DEFAULT_SELF_CLAIM_TTL_MS};
