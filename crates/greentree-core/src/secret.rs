//! Passphrases, authentication proofs and the passphrase KDF.
//!
//! A [`Passphrase`] is only ever held long enough to derive an [`AuthProof`].
//! Both zeroize on drop and neither prints its contents.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{Blake3Hash, EncryptionKey};
use crate::error::{CoreError, Result};
use crate::types::Salt;

const VERIFIER_CONTEXT: &str = "greentree-v0 passphrase verifier";
const UNLOCK_CONTEXT: &str = "greentree-v0 identity unlock";

/// A passphrase held in a buffer that is wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Passphrase(Vec<u8>);

impl Passphrase {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for Passphrase {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for Passphrase {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

/// Deterministic proof of passphrase knowledge for one token.
///
/// Derived with Argon2id under the token's salt. The token stores only a
/// verifier digest of it, and the proof also unlocks the token's sealed keys.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AuthProof([u8; 32]);

impl AuthProof {
    /// Digest stored on the token and compared on verification.
    pub fn verifier(&self) -> Blake3Hash {
        Blake3Hash(blake3::derive_key(VERIFIER_CONTEXT, &self.0))
    }

    /// Key sealing the token's private key material.
    pub(crate) fn unlock_key(&self) -> EncryptionKey {
        EncryptionKey::from_bytes(blake3::derive_key(UNLOCK_CONTEXT, &self.0))
    }
}

impl fmt::Debug for AuthProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthProof(<redacted>)")
    }
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl KdfParams {
    /// Minimum-cost parameters. Only for tests.
    pub const fn fast() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST,
            iterations: Params::MIN_T_COST,
            parallelism: Params::MIN_P_COST,
        }
    }

    /// Derive the authentication proof for `passphrase` under `salt`.
    pub fn derive(&self, passphrase: &Passphrase, salt: &Salt) -> Result<AuthProof> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, Some(32))
            .map_err(|e| CoreError::CryptoFailure(format!("kdf parameters: {e}")))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut proof = AuthProof([0u8; 32]);
        argon2
            .hash_password_into(passphrase.expose(), salt.as_bytes(), &mut proof.0)
            .map_err(|e| CoreError::CryptoFailure(format!("kdf: {e}")))?;
        Ok(proof)
    }
}
