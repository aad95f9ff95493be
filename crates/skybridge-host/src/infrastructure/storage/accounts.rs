//! Account-endpoint cache persistence.
//!
//! The coordinator's cloud fallback mints relay bindings per account; the
//! cache survives restarts as a TOML list of `(account_id, relay_id,
//! throughput, latency)` tuples and is re-read by the account refresh loop
//! on a fixed interval.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use skybridge_core::domain::transport::{AccountEndpoint, PersistedEndpoint};

/// Error type for account store operations.
#[derive(Debug, Error)]
pub enum AccountStoreError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing account cache at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse account cache TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The cache could not be serialized to TOML.
    #[error("failed to serialize account cache: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// On-disk document shape.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheDocument {
    #[serde(default)]
    endpoints: Vec<PersistedEndpoint>,
}

/// File-backed key-value store for account endpoints.
pub struct AccountStore {
    path: PathBuf,
}

impl AccountStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Loads every persisted endpoint, returning an empty list when the
    /// cache file does not yet exist.
    ///
    /// # Errors
    ///
    /// Returns [`AccountStoreError::Io`] for file-system errors other than
    /// "not found", and [`AccountStoreError::Parse`] for malformed TOML.
    pub fn load(&self) -> Result<Vec<AccountEndpoint>, AccountStoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let doc: CacheDocument = toml::from_str(&content)?;
                Ok(doc
                    .endpoints
                    .into_iter()
                    .map(PersistedEndpoint::into_endpoint)
                    .collect())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("account cache absent at {:?}, starting empty", self.path);
                Ok(Vec::new())
            }
            Err(source) => Err(AccountStoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Persists the full endpoint list, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`AccountStoreError::Io`] for file-system failures or
    /// [`AccountStoreError::Serialize`] if serialization fails.
    pub fn save(&self, endpoints: &[AccountEndpoint]) -> Result<(), AccountStoreError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| AccountStoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let doc = CacheDocument {
            endpoints: endpoints.iter().map(PersistedEndpoint::from).collect(),
        };
        let content = toml::to_string_pretty(&doc)?;
        std::fs::write(&self.path, content).map_err(|source| AccountStoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
