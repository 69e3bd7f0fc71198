//! Tokens: passphrase-protected identities that own one chain.
//!
//! A token is identified by its Ed25519 public key. Its private keys are
//! stored sealed under a key derived from the passphrase proof, next to a
//! verifier digest of that proof. The passphrase itself is never stored.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use zeroize::Zeroizing;

use crate::block::{Block, PendingBlock};
use crate::chain::Chain;
use crate::claim::Grantee;
use crate::crypto::{
    Blake3Hash, Ed25519PublicKey, Keypair, X25519PublicKey, X25519StaticSecret,
};
use crate::envelope::EncryptedPayload;
use crate::error::{CoreError, Result, ValidationError};
use crate::secret::{AuthProof, KdfParams, Passphrase};
use crate::types::{now_millis, Salt, Timestamp};

const PAYLOAD_TAG_CONTEXT: &str = "greentree-v0 payload tag";
const SEALED_KEYS_LEN: usize = 64;

/// A passphrase-protected identity and its chain.
///
/// Equality and hashing use the public key only. `Token::default()` is an
/// unkeyed token and never validates.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Token {
    public_key: Ed25519PublicKey,
    exchange_key: X25519PublicKey,
    salt: Salt,
    kdf: KdfParams,
    verifier: Blake3Hash,
    sealed_keys: Option<EncryptedPayload>,
    chain: Chain,
}

impl Token {
    /// Create a token with default KDF parameters.
    pub fn create(passphrase: &Passphrase) -> Result<Self> {
        Self::create_with(passphrase, &KdfParams::default(), now_millis())
    }

    pub fn create_with(passphrase: &Passphrase, kdf: &KdfParams, now: Timestamp) -> Result<Self> {
        Self::create_authenticated(passphrase, kdf, now).map(|(token, _)| token)
    }

    /// Create a token and return the proof derived while doing so.
    ///
    /// Generates fresh signing and exchange keys, so equal passphrases yield
    /// distinct tokens. The chain starts with a ROOT block recording the
    /// creation.
    pub fn create_authenticated(
        passphrase: &Passphrase,
        kdf: &KdfParams,
        now: Timestamp,
    ) -> Result<(Self, AuthProof)> {
        let signing = Keypair::generate();
        let exchange = X25519StaticSecret::generate();
        let salt = Salt::generate();
        let proof = kdf.derive(passphrase, &salt)?;

        let mut secrets = Zeroizing::new([0u8; SEALED_KEYS_LEN]);
        secrets[..32].copy_from_slice(signing.seed().as_slice());
        secrets[32..].copy_from_slice(exchange.to_bytes().as_slice());
        let sealed_keys = EncryptedPayload::encrypt(secrets.as_slice(), &proof.unlock_key())?;

        let public_key = signing.public_key();
        let mut token = Self {
            public_key,
            exchange_key: exchange.public_key(),
            salt,
            kdf: *kdf,
            verifier: proof.verifier(),
            sealed_keys: Some(sealed_keys),
            chain: Chain::new(public_key),
        };

        let root = PendingBlock::root(&token, &proof, format!("created at {now}").as_bytes(), now)?
            .commit();
        token.chain.append(root)?;

        Ok((token, proof))
    }

    /// The stable external identifier.
    pub fn public_key(&self) -> Ed25519PublicKey {
        self.public_key
    }

    /// Alias of [`Token::public_key`].
    pub fn public_identifier(&self) -> Ed25519PublicKey {
        self.public_key
    }

    pub fn exchange_key(&self) -> X25519PublicKey {
        self.exchange_key
    }

    pub fn kdf(&self) -> &KdfParams {
        &self.kdf
    }

    pub(crate) fn verifier(&self) -> &Blake3Hash {
        &self.verifier
    }

    /// Public handle for naming this token in a claim.
    pub fn grantee(&self) -> Grantee {
        Grantee {
            key: self.public_key,
            exchange: self.exchange_key,
        }
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn head(&self) -> Option<&Block> {
        self.chain.head()
    }

    /// Append a block to this token's chain. See [`Chain::append`].
    pub fn append(&mut self, block: Block) -> Result<()> {
        self.chain.append(block)
    }

    /// Derive the authentication proof for `passphrase`.
    pub fn authentication_proof(&self, passphrase: &Passphrase) -> Result<AuthProof> {
        self.kdf.derive(passphrase, &self.salt)
    }

    /// Compare the proof's verifier with the stored one in constant time.
    pub fn verify_passphrase(&self, proof: &AuthProof) -> bool {
        self.is_keyed() && proof.verifier().ct_eq(&self.verifier)
    }

    pub fn is_keyed(&self) -> bool {
        self.public_key != Ed25519PublicKey::ZERO && self.sealed_keys.is_some()
    }

    /// Open the sealed private keys.
    pub(crate) fn unlock(&self, proof: &AuthProof) -> Result<UnlockedKeys> {
        if !self.verify_passphrase(proof) {
            return Err(CoreError::Unauthorized);
        }
        let sealed = self.sealed_keys.as_ref().ok_or(CoreError::Unauthorized)?;

        let secrets = Zeroizing::new(sealed.decrypt(&proof.unlock_key())?);
        if secrets.len() != SEALED_KEYS_LEN {
            return Err(CoreError::CryptoFailure(format!(
                "sealed keys have length {}, expected {}",
                secrets.len(),
                SEALED_KEYS_LEN
            )));
        }

        let mut seed = Zeroizing::new([0u8; 32]);
        seed.copy_from_slice(&secrets[..32]);
        let mut exchange = Zeroizing::new([0u8; 32]);
        exchange.copy_from_slice(&secrets[32..]);

        let keys = UnlockedKeys {
            signing: Keypair::from_seed(&seed),
            exchange: X25519StaticSecret::from_bytes(*exchange),
        };
        if keys.public_key() != self.public_key {
            return Err(CoreError::CryptoFailure(
                "sealed keys do not match identity".into(),
            ));
        }
        Ok(keys)
    }

    /// Check keys and chain, reporting the first failure.
    pub fn check(&self) -> std::result::Result<(), ValidationError> {
        if !self.is_keyed() {
            return Err(ValidationError::UnkeyedIdentity);
        }
        if !self.public_key.is_well_formed() {
            return Err(ValidationError::MalformedIdentityKey);
        }
        if self.chain.owner() != &self.public_key {
            return Err(ValidationError::OwnerMismatch);
        }
        self.chain.verify()
    }

    /// True iff the token is keyed and its chain validates.
    pub fn validate(&self) -> bool {
        self.check().is_ok()
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| CoreError::Encoding(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::Decoding(e.to_string()))
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.public_key.hash(state);
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("public_key", &self.public_key)
            .field("blocks", &self.chain.len())
            .finish_non_exhaustive()
    }
}

/// A token's private keys, opened for the duration of one operation.
///
/// Both keys zeroize themselves on drop.
pub(crate) struct UnlockedKeys {
    signing: Keypair,
    exchange: X25519StaticSecret,
}

impl UnlockedKeys {
    pub(crate) fn public_key(&self) -> Ed25519PublicKey {
        self.signing.public_key()
    }

    pub(crate) fn signing(&self) -> &Keypair {
        &self.signing
    }

    pub(crate) fn exchange(&self) -> &X25519StaticSecret {
        &self.exchange
    }

    /// Key for the issuer-private payload tag.
    pub(crate) fn payload_tag_key(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(blake3::derive_key(PAYLOAD_TAG_CONTEXT, self.signing.seed().as_slice()))
    }
}
