//! SQLite implementation of the TokenStore trait.
//!
//! Uses rusqlite with bundled SQLite, wrapped in async via
//! tokio::spawn_blocking. The encoded token is the source of truth; the
//! `blocks` table is an index of each stored chain.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use greentree_core::{now_millis, BlockHash, Ed25519PublicKey, Timestamp, Token};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{admit, TokenStore};

/// One row of the per-block index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRecord {
    pub position: u64,
    pub hash: BlockHash,
    pub timestamp: Timestamp,
    pub claim_count: usize,
}

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` on the connection from the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut conn)
        })
        .await?
    }

    /// The indexed blocks of a stored chain, in chain order.
    pub async fn block_records(&self, key: &Ed25519PublicKey) -> Result<Vec<BlockRecord>> {
        let key = *key;
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT position, block_hash, timestamp, claim_count
                 FROM blocks WHERE public_key = ?1 ORDER BY position",
            )?;
            let rows = stmt.query_map(params![key.as_bytes().as_slice()], |row| {
                Ok(BlockRecord {
                    position: row.get::<_, i64>(0)? as u64,
                    hash: BlockHash(blob_32(row, 1)?),
                    timestamp: row.get(2)?,
                    claim_count: row.get::<_, i64>(3)? as usize,
                })
            })?;
            let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }
}

fn blob_32(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<[u8; 32]> {
    let bytes: Vec<u8> = row.get(index)?;
    bytes.try_into().map_err(|_| {
        rusqlite::Error::InvalidColumnType(index, "blob32".into(), rusqlite::types::Type::Blob)
    })
}

fn decode(bytes: &[u8]) -> Result<Token> {
    Token::from_bytes(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn select_encoded(conn: &Connection, key: &Ed25519PublicKey) -> Result<Option<Vec<u8>>> {
    conn.query_row(
        "SELECT encoded FROM tokens WHERE public_key = ?1",
        params![key.as_bytes().as_slice()],
        |row| row.get(0),
    )
    .optional()
    .map_err(StoreError::from)
}

#[async_trait]
impl TokenStore for SqliteStore {
    async fn commit(&self, token: &Token) -> Result<()> {
        let token = token.clone();

        self.blocking(move |conn| {
            let key = token.public_key();
            let encoded = token
                .to_bytes()
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            let head_hash = token.head().map(|b| b.hash()).unwrap_or(BlockHash::ZERO);

            let tx = conn.transaction()?;

            let stored = select_encoded(&tx, &key)?
                .map(|bytes| decode(&bytes))
                .transpose()?;
            admit(stored.as_ref(), &token)?;
            let known = stored.map(|t| t.chain().len()).unwrap_or(0);

            tx.execute(
                "INSERT INTO tokens (public_key, exchange_key, chain_len, head_hash, encoded, committed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(public_key) DO UPDATE SET
                    chain_len = excluded.chain_len,
                    head_hash = excluded.head_hash,
                    encoded = excluded.encoded,
                    committed_at = excluded.committed_at",
                params![
                    key.as_bytes().as_slice(),
                    token.exchange_key().as_bytes().as_slice(),
                    token.chain().len() as i64,
                    head_hash.as_bytes().as_slice(),
                    encoded,
                    now_millis(),
                ],
            )?;

            // The stored prefix is unchanged, so only new blocks are indexed.
            for (position, block) in token.chain().blocks().enumerate().skip(known) {
                tx.execute(
                    "INSERT INTO blocks (public_key, position, block_hash, timestamp, claim_count)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        key.as_bytes().as_slice(),
                        position as i64,
                        block.hash().as_bytes().as_slice(),
                        block.timestamp(),
                        block.claims().len() as i64,
                    ],
                )?;
            }

            tx.commit()?;
            tracing::debug!(token = %key, blocks = token.chain().len(), new = token.chain().len() - known, "committed token");
            Ok(())
        })
        .await
    }

    async fn select(&self, key: &Ed25519PublicKey) -> Result<Token> {
        let key = *key;
        self.blocking(move |conn| {
            let bytes = select_encoded(conn, &key)?.ok_or(StoreError::NotFound(key))?;
            decode(&bytes)
        })
        .await
    }

    async fn contains(&self, key: &Ed25519PublicKey) -> Result<bool> {
        let key = *key;
        self.blocking(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM tokens WHERE public_key = ?1",
                    params![key.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn list(&self) -> Result<Vec<Ed25519PublicKey>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT public_key FROM tokens")?;
            let rows = stmt.query_map([], |row| blob_32(row, 0).map(Ed25519PublicKey))?;
            let mut keys = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            keys.sort();
            Ok(keys)
        })
        .await
    }
}
