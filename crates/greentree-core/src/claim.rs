//! Claims: time-bounded read grants attached to a block.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::canonical::{claim_keys, MapEncoder};
use crate::crypto::{Ed25519PublicKey, X25519PublicKey};
use crate::envelope::KeyShare;
use crate::error::{CoreError, Result};
use crate::types::Timestamp;

/// Public handle of a token that can be named in a claim.
///
/// Holds only public keys, never the grantee's token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grantee {
    pub key: Ed25519PublicKey,
    pub exchange: X25519PublicKey,
}

/// Half-open validity window `[not_before, not_after)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimWindow {
    not_before: Timestamp,
    not_after: Timestamp,
}

impl ClaimWindow {
    /// Fails with [`CoreError::InvalidWindow`] unless `not_before < not_after`.
    pub fn new(not_before: Timestamp, not_after: Timestamp) -> Result<Self> {
        if not_before >= not_after {
            return Err(CoreError::InvalidWindow {
                not_before,
                not_after,
            });
        }
        Ok(Self {
            not_before,
            not_after,
        })
    }

    pub fn not_before(&self) -> Timestamp {
        self.not_before
    }

    pub fn not_after(&self) -> Timestamp {
        self.not_after
    }

    pub fn contains(&self, t: Timestamp) -> bool {
        self.not_before <= t && t < self.not_after
    }

    /// Deserialized windows bypass [`ClaimWindow::new`].
    pub(crate) fn is_well_formed(&self) -> bool {
        self.not_before < self.not_after
    }
}

/// A grant letting `grantee` read one block's payload during `window`.
///
/// Once attached to a block the claim also carries the block's content key
/// wrapped for the grantee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    grantee: Grantee,
    window: ClaimWindow,
    share: Option<KeyShare>,
}

impl Claim {
    pub fn new(grantee: Grantee, not_before: Timestamp, not_after: Timestamp) -> Result<Self> {
        Ok(Self::for_window(grantee, ClaimWindow::new(not_before, not_after)?))
    }

    pub fn for_window(grantee: Grantee, window: ClaimWindow) -> Self {
        Self {
            grantee,
            window,
            share: None,
        }
    }

    /// The owner's claim on its own blocks, valid for `ttl_ms` from `now`.
    pub fn implicit_self(grantee: Grantee, now: Timestamp, ttl_ms: i64) -> Result<Self> {
        Self::new(grantee, now, now.saturating_add(ttl_ms))
    }

    pub fn grantee(&self) -> &Grantee {
        &self.grantee
    }

    pub fn window(&self) -> &ClaimWindow {
        &self.window
    }

    pub fn is_valid_at(&self, t: Timestamp) -> bool {
        self.window.contains(t)
    }

    /// Whether this claim names `key`.
    pub fn names(&self, key: &Ed25519PublicKey) -> bool {
        &self.grantee.key == key
    }

    pub fn is_attached(&self) -> bool {
        self.share.is_some()
    }

    pub(crate) fn share(&self) -> Option<&KeyShare> {
        self.share.as_ref()
    }

    pub(crate) fn attach(mut self, share: KeyShare) -> Self {
        self.share = Some(share);
        self
    }

    /// Canonical bytes, covered by the issuing block's signature.
    pub(crate) fn canonical_bytes(&self) -> Vec<u8> {
        let share_digest = self.share.as_ref().map(KeyShare::digest);
        MapEncoder::new()
            .bytes(claim_keys::GRANTEE, self.grantee.key.as_bytes())
            .bytes(claim_keys::EXCHANGE_KEY, self.grantee.exchange.as_bytes())
            .int(claim_keys::NOT_BEFORE, self.window.not_before)
            .int(claim_keys::NOT_AFTER, self.window.not_after)
            .optional_bytes(
                claim_keys::SHARE_DIGEST,
                share_digest.as_ref().map(|d| d.as_bytes().as_slice()),
            )
            .finish()
    }
}

#[cfg(test)]
impl Claim {
    pub(crate) fn with_window_unchecked(mut self, not_after: Timestamp) -> Self {
        self.window.not_after = not_after;
        self
    }
}

impl fmt::Display for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Claim[grantee={}, window=[{}, {})]",
            self.grantee.key, self.window.not_before, self.window.not_after
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grantee() -> Grantee {
        Grantee {
            key: Ed25519PublicKey([1; 32]),
            exchange: X25519PublicKey([2; 32]),
        }
    }

    #[test]
    fn test_window_is_half_open() {
        let claim = Claim::new(grantee(), 1_000, 2_000).unwrap();

        assert!(!claim.is_valid_at(999));
        assert!(claim.is_valid_at(1_000));
        assert!(claim.is_valid_at(1_999));
        assert!(!claim.is_valid_at(2_000));
    }

    #[test]
    fn test_empty_or_inverted_window_rejected() {
        assert!(matches!(
            Claim::new(grantee(), 5, 5),
            Err(CoreError::InvalidWindow { not_before: 5, not_after: 5 })
        ));
        assert!(matches!(
            ClaimWindow::new(10, 3),
            Err(CoreError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn test_implicit_self_claim_window() {
        let claim = Claim::implicit_self(grantee(), 10_000, 60_000).unwrap();
        assert_eq!(claim.window().not_before(), 10_000);
        assert_eq!(claim.window().not_after(), 70_000);
        assert!(claim.names(&grantee().key));
        assert!(!claim.is_attached());

        assert!(Claim::implicit_self(grantee(), 10_000, 0).is_err());
        assert!(Claim::implicit_self(grantee(), i64::MAX, 60_000).is_err());
    }

    #[test]
    fn test_canonical_bytes_depend_on_window() {
        let a = Claim::new(grantee(), 1, 2).unwrap();
        let b = Claim::new(grantee(), 1, 3).unwrap();
        assert_eq!(a.canonical_bytes(), a.clone().canonical_bytes());
        assert_ne!(a.canonical_bytes(), b.canonical_bytes());
    }

    #[test]
    fn test_display_names_grantee() {
        let claim = Claim::new(grantee(), 1, 2).unwrap();
        assert_eq!(
            claim.to_string(),
            "Claim[grantee=0101010101010101, window=[1, 2)]"
        );
    }
}
