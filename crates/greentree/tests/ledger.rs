//! End-to-end ledger scenarios across sessions and store backends.

use std::sync::Arc;

use async_trait::async_trait;
use greentree::core::now_millis;
use greentree::{
    AccessError, AccessGate, ClaimWindow, Ed25519PublicKey, KdfParams, LedgerConfig, LedgerError,
    MemoryStore, Passphrase, Session, SessionStatus, StoreConfig, StoreError, Token, TokenStore,
};

const HOUR_MS: i64 = 3_600_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn config(store: StoreConfig) -> LedgerConfig {
    LedgerConfig {
        store,
        kdf: KdfParams::fast(),
        ..LedgerConfig::default()
    }
}

fn shared_memory() -> Arc<dyn TokenStore> {
    Arc::new(MemoryStore::new())
}

fn claim_counts(token: &Token) -> Vec<usize> {
    token.chain().blocks().map(|b| b.claims().len()).collect()
}

#[tokio::test]
async fn same_passphrase_yields_distinct_tokens() {
    init_tracing();
    let store = shared_memory();
    let cfg = config(StoreConfig::Memory);

    let mut a = Session::new(store.clone(), &cfg).unwrap();
    let mut b = Session::new(store.clone(), &cfg).unwrap();
    let ka = a.register(&Passphrase::from("p1")).await.unwrap();
    let kb = b.register(&Passphrase::from("p1")).await.unwrap();

    assert_ne!(ka, kb);
    assert_ne!(a.token(), b.token());
    assert_eq!(store.list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn grant_window_is_half_open() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let gate = AccessGate::new(store.clone());
    let kdf = KdfParams::fast();

    let (mut owner, owner_proof) =
        Token::create_authenticated(&Passphrase::from("owner"), &kdf, 0).unwrap();
    let (reader, reader_proof) =
        Token::create_authenticated(&Passphrase::from("reader"), &kdf, 0).unwrap();
    store.commit(&owner).await.unwrap();
    store.commit(&reader).await.unwrap();

    let t = 1_700_000_000_000;
    gate.grant_at(
        &mut owner,
        &owner_proof,
        b"p",
        &reader.public_key(),
        ClaimWindow::new(t, t + HOUR_MS).unwrap(),
        t,
    )
    .await
    .unwrap();

    let key = owner.public_key();
    let at = |now| gate.read_at(&reader, &reader_proof, &key, now);
    assert!(at(t - 1).await.unwrap().is_empty());
    assert_eq!(at(t).await.unwrap().len(), 1);
    assert_eq!(at(t + HOUR_MS - 1).await.unwrap()[0].as_ref(), b"p");
    assert!(at(t + HOUR_MS).await.unwrap().is_empty());
}

#[tokio::test]
async fn grant_between_sessions() {
    init_tracing();
    let store = shared_memory();
    let cfg = config(StoreConfig::Memory);

    let mut alice = Session::new(store.clone(), &cfg).unwrap();
    let mut bob = Session::new(store.clone(), &cfg).unwrap();
    let alice_key = alice.register(&Passphrase::from("alice")).await.unwrap();
    let bob_key = bob.register(&Passphrase::from("bob")).await.unwrap();

    alice.append(b"private").await.unwrap();
    let now = now_millis();
    alice
        .grant(b"for bob", &bob_key, now - 1_000, now + HOUR_MS)
        .await
        .unwrap();

    let seen = bob.read(&alice_key).await.unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].as_ref(), b"for bob");

    let own = alice.read_own().await.unwrap();
    assert_eq!(own.len(), 3);
}

#[tokio::test]
async fn self_read_claims_are_not_persisted() {
    init_tracing();
    let store = shared_memory();
    let cfg = config(StoreConfig::Memory);

    let mut alice = Session::new(store.clone(), &cfg).unwrap();
    let mut bob = Session::new(store.clone(), &cfg).unwrap();
    let alice_key = alice.register(&Passphrase::from("alice")).await.unwrap();
    let bob_key = bob.register(&Passphrase::from("bob")).await.unwrap();
    alice.grant(b"shared", &bob_key, 0, i64::MAX).await.unwrap();

    let before = claim_counts(&store.select(&alice_key).await.unwrap());
    assert_eq!(before, vec![0, 1]);

    for _ in 0..3 {
        assert_eq!(alice.read_own().await.unwrap().len(), 2);
    }

    let after = store.select(&alice_key).await.unwrap();
    assert_eq!(claim_counts(&after), before);
    assert!(after.validate());
}

#[tokio::test]
async fn authenticate_checks_passphrase() {
    init_tracing();
    let store = shared_memory();
    let cfg = config(StoreConfig::Memory);

    let mut first = Session::new(store.clone(), &cfg).unwrap();
    let key = first.register(&Passphrase::from("right")).await.unwrap();

    let mut second = Session::new(store.clone(), &cfg).unwrap();
    let err = second
        .authenticate(&key, &Passphrase::from("wrong"))
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(second.status(), SessionStatus::Anonymous);
    assert_eq!(store.select(&key).await.unwrap().chain().len(), 1);

    second
        .authenticate(&key, &Passphrase::from("right"))
        .await
        .unwrap();
    let own = second.read_own().await.unwrap();
    assert_eq!(own.len(), 2);
    assert!(own[1].starts_with(b"authenticated at "));
}

#[tokio::test]
async fn stale_session_cannot_fork_chain() {
    init_tracing();
    let store = shared_memory();
    let cfg = config(StoreConfig::Memory);

    let mut first = Session::new(store.clone(), &cfg).unwrap();
    let key = first.register(&Passphrase::from("p")).await.unwrap();
    let mut second = Session::new(store.clone(), &cfg).unwrap();
    second.authenticate(&key, &Passphrase::from("p")).await.unwrap();

    let err = first.append(b"from stale session").await.unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Access(AccessError::Persistence(StoreError::Conflict { .. }))
    ));
    assert_eq!(first.token().unwrap().chain().len(), 1);
    assert_eq!(store.select(&key).await.unwrap().chain().len(), 2);
}

#[tokio::test]
async fn grant_to_unknown_identity_changes_nothing() {
    init_tracing();
    let store = shared_memory();
    let mut session = Session::new(store.clone(), &config(StoreConfig::Memory)).unwrap();
    let key = session.register(&Passphrase::from("p")).await.unwrap();

    let stranger = Ed25519PublicKey::from([42; 32]);
    let err = session.grant(b"x", &stranger, 0, 10).await.unwrap_err();

    assert!(matches!(
        err,
        LedgerError::Access(AccessError::IdentityNotFound(k)) if k == stranger
    ));
    assert_eq!(session.token().unwrap().chain().len(), 1);
    assert_eq!(store.select(&key).await.unwrap().chain().len(), 1);
}

struct FailingStore;

#[async_trait]
impl TokenStore for FailingStore {
    async fn commit(&self, _token: &Token) -> greentree::store::Result<()> {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "read-only file system",
        )))
    }

    async fn select(&self, key: &Ed25519PublicKey) -> greentree::store::Result<Token> {
        Err(StoreError::NotFound(*key))
    }

    async fn contains(&self, _key: &Ed25519PublicKey) -> greentree::store::Result<bool> {
        Ok(false)
    }

    async fn list(&self) -> greentree::store::Result<Vec<Ed25519PublicKey>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn failed_commit_surfaces_as_persistence_error() {
    init_tracing();
    let mut session =
        Session::new(Arc::new(FailingStore), &config(StoreConfig::Memory)).unwrap();

    let err = session.register(&Passphrase::from("p")).await.unwrap_err();

    assert!(matches!(
        err,
        LedgerError::Access(AccessError::Persistence(StoreError::Io(_)))
    ));
    assert_eq!(session.status(), SessionStatus::Anonymous);
}

async fn roundtrip_through(store_config: StoreConfig) {
    let cfg = config(store_config);

    let mut writer = Session::from_config(&cfg).unwrap();
    let key = writer.register(&Passphrase::from("p")).await.unwrap();
    writer.append(b"one").await.unwrap();
    writer.append(b"two").await.unwrap();
    let written = writer.token().unwrap().clone();
    writer.logout().await.unwrap();

    let store = cfg.store.open().unwrap();
    let loaded = store.select(&key).await.unwrap();
    assert_eq!(loaded, written);
    assert_eq!(loaded.chain().len(), 4);
    for (a, b) in loaded.chain().blocks().zip(written.chain().blocks()) {
        assert_eq!(a, b);
        assert_eq!(a.hash(), b.hash());
    }

    let mut reader = Session::from_config(&cfg).unwrap();
    reader.authenticate(&key, &Passphrase::from("p")).await.unwrap();
    let own = reader.read_own().await.unwrap();
    assert_eq!(own.len(), 5);
    assert_eq!(own[1].as_ref(), b"one");
    assert!(own[3].starts_with(b"logged out at "));
}

#[tokio::test]
async fn file_store_roundtrip() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    roundtrip_through(StoreConfig::File {
        dir: dir.path().join("tokens"),
    })
    .await;
}

#[tokio::test]
async fn sqlite_store_roundtrip() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    roundtrip_through(StoreConfig::Sqlite {
        path: dir.path().join("ledger.db"),
    })
    .await;
}

#[tokio::test]
async fn session_from_toml_config() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("greentree.toml");
    std::fs::write(
        &path,
        format!(
            "self_claim_ttl_ms = 5000\n\n[store]\nbackend = \"file\"\ndir = {:?}\n\n[kdf]\nmemory_kib = 8\niterations = 1\nparallelism = 1\n",
            dir.path().join("tokens").display().to_string()
        ),
    )
    .unwrap();

    let cfg = LedgerConfig::load(&path).unwrap();
    assert_eq!(cfg.self_claim_ttl_ms, 5_000);

    let mut session = Session::from_config(&cfg).unwrap();
    assert_eq!(session.gate().self_claim_ttl_ms(), 5_000);
    let key = session.register(&Passphrase::from("p")).await.unwrap();
    assert!(dir
        .path()
        .join("tokens")
        .join(format!("{}.token", key.to_hex()))
        .is_file());
}
