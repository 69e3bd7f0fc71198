//! Ledger configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty file is a valid
//! configuration:
//!
//! ```toml
//! self_claim_ttl_ms = 60000
//!
//! [store]
//! backend = "file"    # or "memory", "sqlite"
//! dir = "tokens"      # "path" for sqlite
//!
//! [kdf]
//! memory_kib = 19456
//! iterations = 2
//! parallelism = 1
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use greentree_access::DEFAULT_SELF_CLAIM_TTL_MS;
use greentree_core::KdfParams;
use greentree_store::{FileStore, MemoryStore, SqliteStore, TokenStore};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

/// Which token store backs the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Nothing survives the process.
    Memory,
    /// One file per token under `dir`.
    File { dir: PathBuf },
    /// A SQLite database at `path`.
    Sqlite { path: PathBuf },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::File {
            dir: PathBuf::from("tokens"),
        }
    }
}

impl StoreConfig {
    /// Construct the configured store.
    pub fn open(&self) -> Result<Arc<dyn TokenStore>> {
        let store: Arc<dyn TokenStore> = match self {
            StoreConfig::Memory => Arc::new(MemoryStore::new()),
            StoreConfig::File { dir } => Arc::new(FileStore::open(dir.clone())?),
            StoreConfig::Sqlite { path } => Arc::new(SqliteStore::open(path)?),
        };
        tracing::debug!(config = ?self, "opened token store");
        Ok(store)
    }
}

/// Top-level ledger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Lifetime of the implicit claim used when a token reads its own chain.
    pub self_claim_ttl_ms: i64,
    pub store: StoreConfig,
    /// Argon2id parameters for newly registered tokens.
    pub kdf: KdfParams,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            self_claim_ttl_ms: DEFAULT_SELF_CLAIM_TTL_MS,
            store: StoreConfig::default(),
            kdf: KdfParams::default(),
        }
    }
}

impl LedgerConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| LedgerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| LedgerError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| LedgerError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.self_claim_ttl_ms <= 0 {
            return Err(LedgerError::Config(format!(
                "self_claim_ttl_ms must be positive, got {}",
                self.self_claim_ttl_ms
            )));
        }
        if self.kdf.iterations == 0 || self.kdf.parallelism == 0 {
            return Err(LedgerError::Config(
                "kdf iterations and parallelism must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
