//! Client Registry: the durable set of clients the host trusts.
//!
//! This module defines the `ClientRegistry` trait and provides an in-memory
//! implementation for tests plus a JSON-file implementation for hosts
//! without a richer configuration backend.
//!
//! The pairing handshake only ever writes to the registry on a successful
//! final phase; reads serve the post-pairing confirmation and operator tools.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use gsp_crypto::cert::Certificate;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry I/O failed on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("registry file corrupt: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

// ============================================================================
// Data Models
// ============================================================================

/// A client the host has agreed to trust.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedClient {
    /// Client-chosen unique identifier (`uniqueid`)
    pub client_id: String,
    /// The client's certificate, PEM
    pub cert_pem: String,
    /// Unix timestamp when pairing completed
    pub paired_at: u64,
}

impl PairedClient {
    pub fn new(client_id: &str, certificate: &Certificate) -> Self {
        Self {
            client_id: client_id.to_string(),
            cert_pem: String::from_utf8_lossy(certificate.pem()).into_owned(),
            paired_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

// ============================================================================
// Registry Trait
// ============================================================================

/// Storage abstraction for paired clients.
#[async_trait]
pub trait ClientRegistry: Send + Sync {
    /// Record `client_id` as paired with `certificate`.
    ///
    /// Append/replace semantics: pairing the same id again overwrites the
    /// previous certificate rather than adding a second entry.
    async fn add_paired_client(
        &self,
        client_id: &str,
        certificate: &Certificate,
    ) -> Result<(), RegistryError>;

    /// Whether `client_id` has completed pairing.
    async fn is_paired(&self, client_id: &str) -> Result<bool, RegistryError>;

    /// All paired clients, ordered by client id.
    async fn list(&self) -> Result<Vec<PairedClient>, RegistryError>;

    /// Forget a client.
    ///
    /// # Returns
    /// * `Ok(true)` if the client was paired
    /// * `Ok(false)` if it was not
    async fn remove(&self, client_id: &str) -> Result<bool, RegistryError>;
}

// ============================================================================
// In-Memory Registry
// ============================================================================

/// Thread-safe in-memory registry for testing.
#[derive(Default, Clone)]
pub struct InMemoryRegistry {
    clients: Arc<RwLock<HashMap<String, PairedClient>>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }
}

#[async_trait]
impl ClientRegistry for InMemoryRegistry {
    async fn add_paired_client(
        &self,
        client_id: &str,
        certificate: &Certificate,
    ) -> Result<(), RegistryError> {
        let mut clients = self.clients.write().await;
        clients.insert(client_id.to_string(), PairedClient::new(client_id, certificate));
        Ok(())
    }

    async fn is_paired(&self, client_id: &str) -> Result<bool, RegistryError> {
        Ok(self.clients.read().await.contains_key(client_id))
    }

    async fn list(&self) -> Result<Vec<PairedClient>, RegistryError> {
        let clients = self.clients.read().await;
        let mut out: Vec<_> = clients.values().cloned().collect();
        out.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        Ok(out)
    }

    async fn remove(&self, client_id: &str) -> Result<bool, RegistryError> {
        Ok(self.clients.write().await.remove(client_id).is_some())
    }
}

// ============================================================================
// JSON File Registry
// ============================================================================

/// Registry persisted as a JSON array.
///
/// The whole file is rewritten on every change through a temporary file and
/// a rename, so a crash mid-write leaves the previous contents intact. The
/// in-memory view only changes once the file has been written.
pub struct JsonFileRegistry {
    path: PathBuf,
    clients: RwLock<BTreeMap<String, PairedClient>>,
}

impl JsonFileRegistry {
    /// Open the registry at `path`, starting empty if the file does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let clients = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let list: Vec<PairedClient> = serde_json::from_slice(&bytes)
                    .map_err(|e| RegistryError::Corrupt(e.to_string()))?;
                list.into_iter().map(|c| (c.client_id.clone(), c)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(RegistryError::Io { path, source }),
        };

        debug!(path = %path.display(), clients = clients.len(), "Opened client registry");
        Ok(Self {
            path,
            clients: RwLock::new(clients),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, clients: &BTreeMap<String, PairedClient>) -> Result<(), RegistryError> {
        let list: Vec<&PairedClient> = clients.values().collect();
        let bytes = serde_json::to_vec_pretty(&list)
            .map_err(|e| RegistryError::Serialization(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        let io_err = |source| RegistryError::Io {
            path: self.path.clone(),
            source,
        };
        tokio::fs::write(&tmp, &bytes).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl ClientRegistry for JsonFileRegistry {
    async fn add_paired_client(
        &self,
        client_id: &str,
        certificate: &Certificate,
    ) -> Result<(), RegistryError> {
        let mut clients = self.clients.write().await;
        let mut updated = clients.clone();
        updated.insert(client_id.to_string(), PairedClient::new(client_id, certificate));
        self.persist(&updated).await?;
        *clients = updated;
        info!(client_id = %client_id, path = %self.path.display(), "Persisted paired client");
        Ok(())
    }

    async fn is_paired(&self, client_id: &str) -> Result<bool, RegistryError> {
        Ok(self.clients.read().await.contains_key(client_id))
    }

    async fn list(&self) -> Result<Vec<PairedClient>, RegistryError> {
        Ok(self.clients.read().await.values().cloned().collect())
    }

    async fn remove(&self, client_id: &str) -> Result<bool, RegistryError> {
        let mut clients = self.clients.write().await;
        if !clients.contains_key(client_id) {
            return Ok(false);
        }
        let mut updated = clients.clone();
        updated.remove(client_id);
        self.persist(&updated).await?;
        *clients = updated;
        Ok(true)
    }
}
