//! Test fixtures and helpers.
//!
//! Common setup code for integration tests. Helpers panic on failure so
//! scenarios read top to bottom.

use std::sync::Arc;

use bytes::Bytes;
use greentree_access::AccessGate;
use greentree_core::{
    now_millis, AuthProof, Block, Ed25519PublicKey, KdfParams, Passphrase, Timestamp, Token,
};
use greentree_store::{MemoryStore, TokenStore};

/// A registered token together with the proof that unlocks it.
#[derive(Debug, Clone)]
pub struct Party {
    pub token: Token,
    pub proof: AuthProof,
}

impl Party {
    /// Create a party without storing it.
    pub fn offline(passphrase: &str, now: Timestamp) -> Self {
        let (token, proof) =
            Token::create_authenticated(&Passphrase::from(passphrase), &KdfParams::fast(), now)
                .expect("token creation with fast kdf");
        Self { token, proof }
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        self.token.public_key()
    }
}

/// A memory store and an access gate over it.
pub struct TestFixture {
    pub store: Arc<MemoryStore>,
    pub gate: AccessGate<MemoryStore>,
}

impl TestFixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            gate: AccessGate::new(store.clone()),
            store,
        }
    }

    /// Create a party and commit its token.
    pub async fn party(&self, passphrase: &str) -> Party {
        let party = Party::offline(passphrase, now_millis());
        self.store
            .commit(&party.token)
            .await
            .expect("commit of a fresh token");
        party
    }

    /// Create `count` stored parties with distinct passphrases.
    pub async fn parties(&self, count: usize) -> Vec<Party> {
        let mut parties = Vec::with_capacity(count);
        for i in 0..count {
            parties.push(self.party(&format!("party-{i}")).await);
        }
        parties
    }

    /// Append each payload to `party`'s chain in order.
    pub async fn append(&self, party: &mut Party, payloads: &[&[u8]]) -> Vec<Block> {
        let mut blocks = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let block = self
                .gate
                .append(&mut party.token, &party.proof, payload)
                .await
                .expect("append to a stored chain");
            blocks.push(block);
        }
        blocks
    }

    /// Append `payload` readable by `grantee` for the next hour.
    pub async fn grant(&self, owner: &mut Party, payload: &[u8], grantee: &Party) -> Block {
        let now = now_millis();
        self.gate
            .grant(
                &mut owner.token,
                &owner.proof,
                payload,
                &grantee.public_key(),
                now - 1,
                now + 3_600_000,
            )
            .await
            .expect("grant to a stored grantee")
    }

    /// Payloads of `target`'s stored chain that `requester` may read now.
    pub async fn read(&self, requester: &Party, target: &Party) -> Vec<Bytes> {
        self.gate
            .read(&requester.token, &requester.proof, &target.public_key())
            .await
            .expect("read of a stored chain")
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
