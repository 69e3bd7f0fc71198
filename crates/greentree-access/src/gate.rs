//! The access gate.

use std::sync::Arc;

use bytes::Bytes;
use greentree_core::{
    now_millis, AuthProof, Block, Claim, ClaimWindow, CoreError, Ed25519PublicKey, PendingBlock,
    Timestamp, Token,
};
use greentree_store::TokenStore;

use crate::error::{AccessError, Result};

/// Lifetime of the implicit claim minted when a token reads its own chain.
pub const DEFAULT_SELF_CLAIM_TTL_MS: i64 = 60_000;

/// The payloads of `target`'s chain visible to `requester` at `now`, in
/// chain order.
///
/// When the requester is the target, its own blocks open only through an
/// implicit self-claim valid for `[now, now + self_claim_ttl_ms)`. The claim
/// lives for this call alone; if no such window exists the requester sees
/// nothing. Blocks the requester may not read are skipped.
pub fn reveal(
    requester: &Token,
    proof: &AuthProof,
    target: &Token,
    now: Timestamp,
    self_claim_ttl_ms: i64,
) -> Vec<Bytes> {
    let implicit = if requester == target {
        match Claim::implicit_self(requester.grantee(), now, self_claim_ttl_ms) {
            Ok(claim) => Some(claim),
            Err(e) => {
                tracing::warn!(
                    requester = %requester.public_key(),
                    error = %e,
                    "no implicit self-claim"
                );
                return Vec::new();
            }
        }
    } else {
        None
    };

    let mut revealed = Vec::with_capacity(target.chain().len());
    let mut withheld = 0usize;
    for block in target.chain().blocks() {
        match block.data_for_with(requester, proof, now, implicit.as_ref()) {
            Some(payload) => revealed.push(payload),
            None => withheld += 1,
        }
    }

    tracing::debug!(
        requester = %requester.public_key(),
        target = %target.public_key(),
        revealed = revealed.len(),
        withheld,
        "read chain"
    );
    revealed
}

/// Gated reads and chain extension over a [`TokenStore`].
pub struct AccessGate<S: TokenStore + ?Sized> {
    store: Arc<S>,
    self_claim_ttl_ms: i64,
}

impl<S: TokenStore + ?Sized> Clone for AccessGate<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            self_claim_ttl_ms: self.self_claim_ttl_ms,
        }
    }
}

impl<S: TokenStore + ?Sized> AccessGate<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            self_claim_ttl_ms: DEFAULT_SELF_CLAIM_TTL_MS,
        }
    }

    /// Set the lifetime of implicit self-claims. Must be positive.
    pub fn with_self_claim_ttl(mut self, ttl_ms: i64) -> Result<Self> {
        if ttl_ms <= 0 {
            return Err(AccessError::InvalidSelfClaimTtl(ttl_ms));
        }
        self.self_claim_ttl_ms = ttl_ms;
        Ok(self)
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn self_claim_ttl_ms(&self) -> i64 {
        self.self_claim_ttl_ms
    }

    /// Read the payloads of `target`'s chain that `requester` may see now.
    pub async fn read(
        &self,
        requester: &Token,
        proof: &AuthProof,
        target: &Ed25519PublicKey,
    ) -> Result<Vec<Bytes>> {
        self.read_at(requester, proof, target, now_millis()).await
    }

    /// [`AccessGate::read`] at an explicit time.
    ///
    /// Reads the latest committed snapshot of the target.
    pub async fn read_at(
        &self,
        requester: &Token,
        proof: &AuthProof,
        target: &Ed25519PublicKey,
        now: Timestamp,
    ) -> Result<Vec<Bytes>> {
        let snapshot = self.store.select(target).await?;
        Ok(reveal(
            requester,
            proof,
            &snapshot,
            now,
            self.self_claim_ttl_ms,
        ))
    }

    /// Append `payload` to `owner`'s chain.
    pub async fn append(&self, owner: &mut Token, proof: &AuthProof, payload: &[u8]) -> Result<Block> {
        self.append_at(owner, proof, payload, now_millis()).await
    }

    pub async fn append_at(
        &self,
        owner: &mut Token,
        proof: &AuthProof,
        payload: &[u8],
        now: Timestamp,
    ) -> Result<Block> {
        self.extend(owner, proof, payload, None, now).await
    }

    /// Append `payload` with a claim letting `grantee` read it during
    /// `[not_before, not_after)`.
    pub async fn grant(
        &self,
        owner: &mut Token,
        proof: &AuthProof,
        payload: &[u8],
        grantee: &Ed25519PublicKey,
        not_before: Timestamp,
        not_after: Timestamp,
    ) -> Result<Block> {
        if !owner.verify_passphrase(proof) {
            return Err(CoreError::Unauthorized.into());
        }
        let window = ClaimWindow::new(not_before, not_after)?;
        self.grant_at(owner, proof, payload, grantee, window, now_millis())
            .await
    }

    /// [`AccessGate::grant`] with a prepared window at an explicit time.
    ///
    /// Fails with `Unauthorized` if the proof does not verify against
    /// `owner`, and with `IdentityNotFound` if the store does not know the
    /// grantee. The owner is unchanged on any failure.
    pub async fn grant_at(
        &self,
        owner: &mut Token,
        proof: &AuthProof,
        payload: &[u8],
        grantee: &Ed25519PublicKey,
        window: ClaimWindow,
        now: Timestamp,
    ) -> Result<Block> {
        if !owner.verify_passphrase(proof) {
            return Err(CoreError::Unauthorized.into());
        }

        let grantee = self.store.select(grantee).await?.grantee();
        let claim = Claim::for_window(grantee, window);
        self.extend(owner, proof, payload, Some(claim), now).await
    }

    async fn extend(
        &self,
        owner: &mut Token,
        proof: &AuthProof,
        payload: &[u8],
        claim: Option<Claim>,
        now: Timestamp,
    ) -> Result<Block> {
        let current: &Token = owner;
        let mut pending = match current.head() {
            Some(head) => PendingBlock::chained(current, proof, payload, head, now)?,
            None => PendingBlock::root(current, proof, payload, now)?,
        };
        if let Some(claim) = claim {
            pending.add_claim(claim, proof)?;
        }
        let block = pending.commit();

        let mut next = current.clone();
        next.append(block.clone())?;
        self.store.commit(&next).await?;

        tracing::info!(
            token = %next.public_key(),
            block = %block.hash(),
            claims = block.claims().len(),
            "extended chain"
        );
        *owner = next;
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AccessError;
    use async_trait::async_trait;
    use greentree_core::{KdfParams, Passphrase};
    use greentree_store::{MemoryStore, StoreError};

    const HOUR_MS: i64 = 3_600_000;

    async fn party(store: &MemoryStore, passphrase: &str) -> (Token, AuthProof) {
        let (token, proof) =
            Token::create_authenticated(&Passphrase::from(passphrase), &KdfParams::fast(), 1_000)
                .unwrap();
        store.commit(&token).await.unwrap();
        (token, proof)
    }

    fn gate() -> (Arc<MemoryStore>, AccessGate<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), AccessGate::new(store))
    }

    #[tokio::test]
    async fn test_self_read_returns_every_block() {
        let (store, gate) = gate();
        let (mut owner, proof) = party(&store, "owner").await;
        gate.append_at(&mut owner, &proof, b"one", 2_000).await.unwrap();
        gate.append_at(&mut owner, &proof, b"two", 3_000).await.unwrap();

        let payloads = gate
            .read_at(&owner, &proof, &owner.public_key(), 10_000)
            .await
            .unwrap();

        assert_eq!(payloads.len(), 3);
        assert_eq!(payloads[0].as_ref(), b"created at 1000");
        assert_eq!(payloads[1].as_ref(), b"one");
        assert_eq!(payloads[2].as_ref(), b"two");
    }

    #[tokio::test]
    async fn test_self_read_does_not_store_claims() {
        let (store, gate) = gate();
        let (mut owner, proof) = party(&store, "owner").await;
        gate.append_at(&mut owner, &proof, b"one", 2_000).await.unwrap();

        gate.read_at(&owner, &proof, &owner.public_key(), 10_000)
            .await
            .unwrap();

        let stored = store.select(&owner.public_key()).await.unwrap();
        assert!(stored.chain().blocks().all(|b| b.claims().is_empty()));
    }

    #[tokio::test]
    async fn test_grant_window() {
        let (store, gate) = gate();
        let (mut owner, owner_proof) = party(&store, "owner").await;
        let (reader, reader_proof) = party(&store, "reader").await;
        let t = 50_000;

        let block = gate
            .grant_at(
                &mut owner,
                &owner_proof,
                b"shared",
                &reader.public_key(),
                ClaimWindow::new(t, t + HOUR_MS).unwrap(),
                t,
            )
            .await
            .unwrap();
        assert_eq!(block.claims().len(), 1);
        assert_eq!(owner.head().map(Block::hash), Some(block.hash()));

        let owner_key = owner.public_key();
        let read = |now| gate.read_at(&reader, &reader_proof, &owner_key, now);
        assert!(read(t - 1).await.unwrap().is_empty());
        assert_eq!(read(t).await.unwrap(), vec![Bytes::from_static(b"shared")]);
        assert_eq!(read(t + HOUR_MS - 1).await.unwrap().len(), 1);
        assert!(read(t + HOUR_MS).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stranger_sees_nothing() {
        let (store, gate) = gate();
        let (mut owner, owner_proof) = party(&store, "owner").await;
        let (reader, _) = party(&store, "reader").await;
        let (stranger, stranger_proof) = party(&store, "stranger").await;

        gate.grant_at(
            &mut owner,
            &owner_proof,
            b"shared",
            &reader.public_key(),
            ClaimWindow::new(0, HOUR_MS).unwrap(),
            10,
        )
        .await
        .unwrap();

        let payloads = gate
            .read_at(&stranger, &stranger_proof, &owner.public_key(), 10)
            .await
            .unwrap();
        assert!(payloads.is_empty());
    }

    #[tokio::test]
    async fn test_grant_rejects_bad_proof_and_window() {
        let (store, gate) = gate();
        let (mut owner, _) = party(&store, "owner").await;
        let (reader, reader_proof) = party(&store, "reader").await;
        let wrong = owner.authentication_proof(&Passphrase::from("guess")).unwrap();

        let err = gate
            .grant(&mut owner, &reader_proof, b"x", &reader.public_key(), 0, 10)
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());

        let err = gate
            .grant(&mut owner, &wrong, b"x", &reader.public_key(), 10, 0)
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());

        let proof = owner.authentication_proof(&Passphrase::from("owner")).unwrap();
        let err = gate
            .grant(&mut owner, &proof, b"x", &reader.public_key(), 10, 10)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccessError::Core(CoreError::InvalidWindow { .. })
        ));
        assert_eq!(owner.chain().len(), 1);
    }

    #[tokio::test]
    async fn test_grant_to_unknown_identity() {
        let (store, gate) = gate();
        let (mut owner, proof) = party(&store, "owner").await;
        let (unregistered, _) =
            Token::create_authenticated(&Passphrase::from("x"), &KdfParams::fast(), 1).unwrap();

        let err = gate
            .grant_at(
                &mut owner,
                &proof,
                b"x",
                &unregistered.public_key(),
                ClaimWindow::new(0, 10).unwrap(),
                5,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AccessError::IdentityNotFound(k) if k == unregistered.public_key()));
        assert_eq!(owner.chain().len(), 1);
        assert_eq!(store.select(&owner.public_key()).await.unwrap().chain().len(), 1);
    }

    #[tokio::test]
    async fn test_read_unknown_target() {
        let (store, gate) = gate();
        let (reader, proof) = party(&store, "reader").await;

        let err = gate
            .read_at(&reader, &proof, &Ed25519PublicKey::from([9; 32]), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::IdentityNotFound(_)));
    }

    struct FailingStore;

    #[async_trait]
    impl TokenStore for FailingStore {
        async fn commit(&self, _token: &Token) -> greentree_store::Result<()> {
            Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        }

        async fn select(&self, key: &Ed25519PublicKey) -> greentree_store::Result<Token> {
            Err(StoreError::NotFound(*key))
        }

        async fn contains(&self, _key: &Ed25519PublicKey) -> greentree_store::Result<bool> {
            Ok(false)
        }

        async fn list(&self) -> greentree_store::Result<Vec<Ed25519PublicKey>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_owner_unchanged() {
        let gate = AccessGate::new(Arc::new(FailingStore));
        let (mut owner, proof) =
            Token::create_authenticated(&Passphrase::from("owner"), &KdfParams::fast(), 1).unwrap();
        let head = owner.head().map(Block::hash);

        let err = gate.append_at(&mut owner, &proof, b"lost", 2).await.unwrap_err();

        assert!(matches!(err, AccessError::Persistence(StoreError::Io(_))));
        assert_eq!(owner.chain().len(), 1);
        assert_eq!(owner.head().map(Block::hash), head);
    }

    #[tokio::test]
    async fn test_stale_owner_conflicts() {
        let (store, gate) = gate();
        let (mut owner, proof) = party(&store, "owner").await;
        let mut stale = owner.clone();

        gate.append_at(&mut owner, &proof, b"first", 2).await.unwrap();
        let err = gate.append_at(&mut stale, &proof, b"second", 3).await.unwrap_err();

        assert!(matches!(
            err,
            AccessError::Persistence(StoreError::Conflict { .. })
        ));
        assert_eq!(stale.chain().len(), 1);
    }

    #[test]
    fn test_self_read_needs_a_self_claim_window() {
        let (owner, proof) =
            Token::create_authenticated(&Passphrase::from("owner"), &KdfParams::fast(), 1).unwrap();

        assert_eq!(reveal(&owner, &proof, &owner, 5, DEFAULT_SELF_CLAIM_TTL_MS).len(), 1);
        assert_eq!(reveal(&owner, &proof, &owner, 5, 1).len(), 1);
        assert!(reveal(&owner, &proof, &owner, 5, 0).is_empty());
        assert!(reveal(&owner, &proof, &owner, 5, -5).is_empty());
        assert!(reveal(&owner, &proof, &owner, i64::MAX, DEFAULT_SELF_CLAIM_TTL_MS).is_empty());
    }

    #[test]
    fn test_self_claim_ttl_must_be_positive() {
        let store = Arc::new(MemoryStore::new());

        for ttl in [0, -1, i64::MIN] {
            assert!(matches!(
                AccessGate::new(store.clone()).with_self_claim_ttl(ttl),
                Err(AccessError::InvalidSelfClaimTtl(t)) if t == ttl
            ));
        }
        let gate = AccessGate::new(store).with_self_claim_ttl(1).unwrap();
        assert_eq!(gate.self_claim_ttl_ms(), 1);
    }
}
