//! Directory-backed implementation of the TokenStore trait.
//!
//! Each token is one CBOR file named `<hex public key>.token`. Commits write a
//! temporary file in the same directory and rename it over the old one, so a
//! crash leaves either the previous snapshot or the new one.
//!
//! Commits hold an exclusive advisory lock on the directory's `.lock` file for
//! the whole read-check-write cycle, so every store opened on the same
//! directory, in this process or another, sees the others' commits.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use fs2::FileExt;
use greentree_core::{Ed25519PublicKey, Token};
use tempfile::NamedTempFile;

use crate::error::{Result, StoreError};
use crate::traits::{admit, TokenStore};

const EXTENSION: &str = "token";
const LOCK_FILE: &str = ".lock";

/// File-per-token store rooted at a directory.
#[derive(Clone)]
pub struct FileStore {
    dir: Arc<PathBuf>,
}

impl FileStore {
    /// Open the store at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir: Arc::new(dir) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key`.
    pub fn path_for(&self, key: &Ed25519PublicKey) -> PathBuf {
        token_path(&self.dir, key)
    }
}

fn token_path(dir: &Path, key: &Ed25519PublicKey) -> PathBuf {
    dir.join(format!("{}.{}", key.to_hex(), EXTENSION))
}

/// Block until this handle holds the directory lock. Dropping the file
/// releases it.
fn lock_dir(dir: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(dir.join(LOCK_FILE))?;
    file.lock_exclusive()?;
    Ok(file)
}

/// Read and decode the token at `path`, `None` if the file does not exist.
fn read_token(path: &Path, key: &Ed25519PublicKey) -> Result<Option<Token>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let token = Token::from_bytes(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
    if token.public_key() != *key {
        return Err(StoreError::Serialization(format!(
            "{} holds token {}",
            path.display(),
            token.public_key()
        )));
    }
    Ok(Some(token))
}

#[async_trait]
impl TokenStore for FileStore {
    async fn commit(&self, token: &Token) -> Result<()> {
        let token = token.clone();
        let dir = self.dir.clone();

        tokio::task::spawn_blocking(move || {
            let _lock = lock_dir(&dir)?;
            let key = token.public_key();
            let path = token_path(&dir, &key);

            let stored = read_token(&path, &key)?;
            admit(stored.as_ref(), &token)?;

            let encoded = token
                .to_bytes()
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            let mut tmp = NamedTempFile::new_in(dir.as_path())?;
            tmp.write_all(&encoded)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;

            tracing::debug!(
                token = %key,
                blocks = token.chain().len(),
                path = %path.display(),
                "committed token"
            );
            Ok(())
        })
        .await?
    }

    async fn select(&self, key: &Ed25519PublicKey) -> Result<Token> {
        let key = *key;
        let dir = self.dir.clone();

        tokio::task::spawn_blocking(move || {
            read_token(&token_path(&dir, &key), &key)?.ok_or(StoreError::NotFound(key))
        })
        .await?
    }

    async fn contains(&self, key: &Ed25519PublicKey) -> Result<bool> {
        let path = self.path_for(key);
        Ok(tokio::task::spawn_blocking(move || path.is_file()).await?)
    }

    async fn list(&self) -> Result<Vec<Ed25519PublicKey>> {
        let dir = self.dir.clone();

        tokio::task::spawn_blocking(move || {
            let mut keys = Vec::new();
            for entry in std::fs::read_dir(dir.as_path())? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                    continue;
                }
                // Ignore stray files whose stem is not a key.
                if let Some(key) = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| Ed25519PublicKey::from_hex(s).ok())
                {
                    keys.push(key);
                }
            }
            keys.sort();
            Ok(keys)
        })
        .await?
    }
}
