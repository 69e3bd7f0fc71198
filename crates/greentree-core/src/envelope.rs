//! Sealed payloads and key shares.
//!
//! Each block payload is encrypted under a fresh content key. The content key
//! is then wrapped once for the issuer and once per claim, using X25519 with
//! an ephemeral sender key and ChaCha20-Poly1305.

use serde::{Deserialize, Serialize};

use crate::crypto::{
    Blake3Hash, EncryptionKey, EncryptionNonce, EphemeralKeyPair, X25519PublicKey,
    X25519StaticSecret,
};
use crate::error::{CoreError, Result};

/// Format identifier for encrypted payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EncryptionFormat {
    /// ChaCha20-Poly1305 with 256-bit key.
    ChaCha20Poly1305 = 1,
}

/// An encrypted payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub format: EncryptionFormat,
    pub nonce: EncryptionNonce,
    /// Ciphertext including the authentication tag.
    pub ciphertext: Vec<u8>,
}

impl EncryptedPayload {
    /// Encrypt plaintext with the given key under a fresh nonce.
    pub fn encrypt(plaintext: &[u8], key: &EncryptionKey) -> Result<Self> {
        let nonce = EncryptionNonce::generate();
        let ciphertext = key.encrypt(plaintext, &nonce)?;

        Ok(Self {
            format: EncryptionFormat::ChaCha20Poly1305,
            nonce,
            ciphertext,
        })
    }

    pub fn decrypt(&self, key: &EncryptionKey) -> Result<Vec<u8>> {
        match self.format {
            EncryptionFormat::ChaCha20Poly1305 => key.decrypt(&self.ciphertext, &self.nonce),
        }
    }

    /// Digest of nonce and ciphertext, bound into the block hash.
    pub fn digest(&self) -> Blake3Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&[self.format as u8]);
        hasher.update(self.nonce.as_bytes());
        hasher.update(&self.ciphertext);
        Blake3Hash(*hasher.finalize().as_bytes())
    }
}

/// A content key wrapped for one X25519 recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyShare {
    /// Sender's side of the ECDH.
    pub ephemeral_public: X25519PublicKey,
    pub encrypted_key: Vec<u8>,
    pub nonce: EncryptionNonce,
}

impl KeyShare {
    /// Wrap `content_key` so only the holder of `recipient`'s secret can open it.
    ///
    /// `context` binds the share to the block it belongs to.
    pub fn wrap(
        content_key: &EncryptionKey,
        recipient: &X25519PublicKey,
        context: &[u8],
    ) -> Result<Self> {
        let ephemeral = EphemeralKeyPair::generate();
        let ephemeral_public = ephemeral.public_key();
        let wrap_key = ephemeral.diffie_hellman(recipient).derive_encryption_key(context);

        let nonce = EncryptionNonce::generate();
        let encrypted_key = wrap_key.encrypt(content_key.as_bytes(), &nonce)?;

        Ok(Self {
            ephemeral_public,
            encrypted_key,
            nonce,
        })
    }

    /// Recover the content key with the recipient's secret.
    pub fn open(&self, recipient: &X25519StaticSecret, context: &[u8]) -> Result<EncryptionKey> {
        let wrap_key = recipient
            .diffie_hellman(&self.ephemeral_public)
            .derive_encryption_key(context);
        let key_bytes = zeroize::Zeroizing::new(wrap_key.decrypt(&self.encrypted_key, &self.nonce)?);

        let arr: [u8; 32] = key_bytes.as_slice().try_into().map_err(|_| {
            CoreError::CryptoFailure(format!(
                "invalid key length: expected 32, got {}",
                key_bytes.len()
            ))
        })?;
        Ok(EncryptionKey::from_bytes(arr))
    }

    pub fn digest(&self) -> Blake3Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.ephemeral_public.as_bytes());
        hasher.update(self.nonce.as_bytes());
        hasher.update(&self.encrypted_key);
        Blake3Hash(*hasher.finalize().as_bytes())
    }
}
