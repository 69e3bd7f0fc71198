//! The Session: one caller's view of the ledger.
//!
//! A session starts anonymous, becomes authenticated by registering a new
//! token or by proving the passphrase of a stored one, and ends with
//! [`Session::logout`]. While authenticated it holds the token and its
//! authentication proof; the passphrase itself is dropped as soon as the
//! proof is derived.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use greentree_access::{AccessError, AccessGate};
use greentree_core::{
    now_millis, AuthProof, Block, CoreError, Ed25519PublicKey, KdfParams, Passphrase, Timestamp,
    Token,
};
use greentree_store::TokenStore;

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Anonymous,
    Authenticated,
    /// Terminal.
    LoggedOut,
}

enum SessionState {
    Anonymous,
    Authenticated { token: Token, proof: AuthProof },
    LoggedOut,
}

/// Sequences register, authenticate, read, extend and logout calls.
///
/// Sessions are constructed explicitly around an injected store; any number
/// can share one store.
pub struct Session<S: TokenStore + ?Sized = dyn TokenStore> {
    gate: AccessGate<S>,
    kdf: KdfParams,
    state: SessionState,
}

impl Session {
    /// Open the configured store and start an anonymous session on it.
    pub fn from_config(config: &LedgerConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.store.open()?, config)
    }
}

impl<S: TokenStore + ?Sized> Session<S> {
    /// Start an anonymous session.
    ///
    /// Fails with `Config` if `config` does not validate.
    pub fn new(store: Arc<S>, config: &LedgerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            gate: AccessGate::new(store).with_self_claim_ttl(config.self_claim_ttl_ms)?,
            kdf: config.kdf,
            state: SessionState::Anonymous,
        })
    }

    pub fn status(&self) -> SessionStatus {
        match self.state {
            SessionState::Anonymous => SessionStatus::Anonymous,
            SessionState::Authenticated { .. } => SessionStatus::Authenticated,
            SessionState::LoggedOut => SessionStatus::LoggedOut,
        }
    }

    /// Key of the authenticated token.
    pub fn public_key(&self) -> Option<Ed25519PublicKey> {
        self.token().map(Token::public_key)
    }

    /// The authenticated token as of its last commit.
    pub fn token(&self) -> Option<&Token> {
        match &self.state {
            SessionState::Authenticated { token, .. } => Some(token),
            _ => None,
        }
    }

    pub fn gate(&self) -> &AccessGate<S> {
        &self.gate
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Identity
    // ─────────────────────────────────────────────────────────────────────────

    /// Create and store a new token, then authenticate as it.
    ///
    /// Replaces any token the session was authenticated as.
    pub async fn register(&mut self, passphrase: &Passphrase) -> Result<Ed25519PublicKey> {
        self.ensure_open()?;

        let (token, proof) = Token::create_authenticated(passphrase, &self.kdf, now_millis())?;
        self.gate
            .store()
            .commit(&token)
            .await
            .map_err(AccessError::from)?;

        let key = token.public_key();
        tracing::info!(token = %key, "registered token");
        self.state = SessionState::Authenticated { token, proof };
        Ok(key)
    }

    /// Authenticate as the stored token `key`.
    ///
    /// Records the event on the token's chain. A wrong passphrase fails with
    /// `Unauthorized` and leaves the session as it was.
    pub async fn authenticate(&mut self, key: &Ed25519PublicKey, passphrase: &Passphrase) -> Result<()> {
        self.ensure_open()?;

        let mut token = self.gate.store().select(key).await.map_err(AccessError::from)?;
        let proof = token.authentication_proof(passphrase)?;
        if !token.verify_passphrase(&proof) {
            tracing::warn!(token = %key, "authentication failed");
            return Err(CoreError::Unauthorized.into());
        }

        let now = now_millis();
        self.gate
            .append_at(&mut token, &proof, event("authenticated", now).as_bytes(), now)
            .await?;

        tracing::info!(token = %key, "authenticated");
        self.state = SessionState::Authenticated { token, proof };
        Ok(())
    }

    /// Record the logout on the chain and forget the token and proof.
    ///
    /// The session ends and drops its credentials even if the logout block
    /// cannot be committed; that failure is still returned.
    pub async fn logout(&mut self) -> Result<()> {
        let state = std::mem::replace(&mut self.state, SessionState::LoggedOut);
        let (mut token, proof) = match state {
            SessionState::Authenticated { token, proof } => (token, proof),
            SessionState::Anonymous => {
                self.state = SessionState::Anonymous;
                return Err(LedgerError::NotAuthenticated);
            }
            SessionState::LoggedOut => return Err(LedgerError::SessionClosed),
        };
        let key = token.public_key();

        let now = now_millis();
        match self
            .gate
            .append_at(&mut token, &proof, event("logged out", now).as_bytes(), now)
            .await
        {
            Ok(_) => {
                tracing::info!(token = %key, "logged out");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(token = %key, error = %e, "logged out without recording it");
                Err(e.into())
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reading
    // ─────────────────────────────────────────────────────────────────────────

    /// Payloads of `target`'s chain this session may read.
    pub async fn read(&self, target: &Ed25519PublicKey) -> Result<Vec<Bytes>> {
        let (token, proof) = credentials(&self.state)?;
        Ok(self.gate.read(token, proof, target).await?)
    }

    /// Every payload of the session's own chain.
    pub async fn read_own(&self) -> Result<Vec<Bytes>> {
        let (token, proof) = credentials(&self.state)?;
        Ok(self.gate.read(token, proof, &token.public_key()).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Extending
    // ─────────────────────────────────────────────────────────────────────────

    /// Append `payload` to the session's chain.
    pub async fn append(&mut self, payload: &[u8]) -> Result<Block> {
        let (token, proof) = credentials_mut(&mut self.state)?;
        Ok(self.gate.append(token, proof, payload).await?)
    }

    /// Append `payload` readable by `grantee` during `[not_before, not_after)`.
    pub async fn grant(
        &mut self,
        payload: &[u8],
        grantee: &Ed25519PublicKey,
        not_before: Timestamp,
        not_after: Timestamp,
    ) -> Result<Block> {
        let (token, proof) = credentials_mut(&mut self.state)?;
        Ok(self
            .gate
            .grant(token, proof, payload, grantee, not_before, not_after)
            .await?)
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            SessionState::LoggedOut => Err(LedgerError::SessionClosed),
            _ => Ok(()),
        }
    }
}

impl<S: TokenStore + ?Sized> fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("status", &self.status())
            .field("token", &self.public_key())
            .finish()
    }
}

fn event(what: &str, now: Timestamp) -> String {
    format!("{what} at {now}")
}

fn credentials(state: &SessionState) -> Result<(&Token, &AuthProof)> {
    match state {
        SessionState::Authenticated { token, proof } => Ok((token, proof)),
        SessionState::Anonymous => Err(LedgerError::NotAuthenticated),
        SessionState::LoggedOut => Err(LedgerError::SessionClosed),
    }
}

fn credentials_mut(state: &mut SessionState) -> Result<(&mut Token, &AuthProof)> {
    match state {
        SessionState::Authenticated { token, proof } => Ok((token, &*proof)),
        SessionState::Anonymous => Err(LedgerError::NotAuthenticated),
        SessionState::LoggedOut => Err(LedgerError::SessionClosed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use async_trait::async_trait;
    use greentree_store::{MemoryStore, StoreError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config() -> LedgerConfig {
        LedgerConfig {
            store: StoreConfig::Memory,
            kdf: KdfParams::fast(),
            ..LedgerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_anonymous_session_cannot_act() {
        let mut session = Session::new(Arc::new(MemoryStore::new()), &config()).unwrap();

        assert_eq!(session.status(), SessionStatus::Anonymous);
        assert!(session.public_key().is_none());
        assert!(matches!(session.read_own().await, Err(LedgerError::NotAuthenticated)));
        assert!(matches!(session.append(b"x").await, Err(LedgerError::NotAuthenticated)));
        assert!(matches!(session.logout().await, Err(LedgerError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_register_append_logout() {
        let store = Arc::new(MemoryStore::new());
        let mut session = Session::new(store.clone(), &config()).unwrap();

        let key = session.register(&Passphrase::from("p1")).await.unwrap();
        assert_eq!(session.status(), SessionStatus::Authenticated);
        assert_eq!(session.public_key(), Some(key));

        session.append(b"note").await.unwrap();
        let own = session.read_own().await.unwrap();
        assert_eq!(own.len(), 2);
        assert_eq!(own[1].as_ref(), b"note");

        session.logout().await.unwrap();
        assert_eq!(session.status(), SessionStatus::LoggedOut);
        assert!(session.token().is_none());

        let stored = store.select(&key).await.unwrap();
        assert_eq!(stored.chain().len(), 3);
    }

    #[tokio::test]
    async fn test_closed_session_rejects_everything() {
        let mut session = Session::new(Arc::new(MemoryStore::new()), &config()).unwrap();
        let key = session.register(&Passphrase::from("p1")).await.unwrap();
        session.logout().await.unwrap();

        assert!(matches!(session.append(b"x").await, Err(LedgerError::SessionClosed)));
        assert!(matches!(session.read(&key).await, Err(LedgerError::SessionClosed)));
        assert!(matches!(
            session.register(&Passphrase::from("p2")).await,
            Err(LedgerError::SessionClosed)
        ));
        assert!(matches!(
            session.authenticate(&key, &Passphrase::from("p1")).await,
            Err(LedgerError::SessionClosed)
        ));
    }

    /// Accepts `writes` commits, then fails every later one.
    struct WearingOutStore {
        inner: MemoryStore,
        writes: AtomicUsize,
    }

    impl WearingOutStore {
        fn new(writes: usize) -> Self {
            Self {
                inner: MemoryStore::new(),
                writes: AtomicUsize::new(writes),
            }
        }
    }

    #[async_trait]
    impl TokenStore for WearingOutStore {
        async fn commit(&self, token: &Token) -> greentree_store::Result<()> {
            let left = self.writes.load(Ordering::SeqCst);
            if left == 0 {
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "device removed",
                )));
            }
            self.writes.store(left - 1, Ordering::SeqCst);
            self.inner.commit(token).await
        }

        async fn select(&self, key: &Ed25519PublicKey) -> greentree_store::Result<Token> {
            self.inner.select(key).await
        }

        async fn contains(&self, key: &Ed25519PublicKey) -> greentree_store::Result<bool> {
            self.inner.contains(key).await
        }

        async fn list(&self) -> greentree_store::Result<Vec<Ed25519PublicKey>> {
            self.inner.list().await
        }
    }

    #[tokio::test]
    async fn test_failed_logout_still_drops_credentials() {
        let store = Arc::new(WearingOutStore::new(1));
        let mut session = Session::new(store.clone(), &config()).unwrap();
        let key = session.register(&Passphrase::from("p1")).await.unwrap();

        let err = session.logout().await.unwrap_err();

        assert!(matches!(
            err,
            LedgerError::Access(AccessError::Persistence(StoreError::Io(_)))
        ));
        assert_eq!(session.status(), SessionStatus::LoggedOut);
        assert!(session.token().is_none());
        assert!(matches!(session.read_own().await, Err(LedgerError::SessionClosed)));
        assert_eq!(store.select(&key).await.unwrap().chain().len(), 1);
    }

    #[tokio::test]
    async fn test_anonymous_logout_keeps_session_open() {
        let mut session = Session::new(Arc::new(MemoryStore::new()), &config()).unwrap();

        assert!(matches!(session.logout().await, Err(LedgerError::NotAuthenticated)));
        assert_eq!(session.status(), SessionStatus::Anonymous);
        session.register(&Passphrase::from("p1")).await.unwrap();
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = LedgerConfig {
            self_claim_ttl_ms: 0,
            ..config()
        };
        assert!(matches!(
            Session::new(Arc::new(MemoryStore::new()), &config),
            Err(LedgerError::Config(_))
        ));
    }

    #[test]
    fn test_debug_shows_status_only() {
        let session = Session::new(Arc::new(MemoryStore::new()), &config()).unwrap();
        assert_eq!(format!("{:?}", session), "Session { status: Anonymous, token: None }");
    }
}
