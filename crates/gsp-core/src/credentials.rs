//! Certificate Store: the host's long-lived certificate and private key.
//!
//! Owned by the surrounding configuration subsystem; the handshake only reads
//! from it. Credentials are loaded once and shared behind an `Arc`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::info;

use gsp_crypto::cert::{CertError, Certificate};
use gsp_crypto::signing::{KeyError, PrivateKey};

#[derive(Debug, Error)]
pub enum CertStoreError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("host certificate invalid: {0}")]
    Certificate(#[from] CertError),

    #[error("host private key invalid: {0}")]
    Key(#[from] KeyError),

    #[error("host private key does not match host certificate")]
    KeyMismatch,
}

/// Host certificate plus the private key for its subject public key.
#[derive(Debug)]
pub struct HostCredentials {
    pub certificate: Certificate,
    pub key: PrivateKey,
}

impl HostCredentials {
    /// Build from PEM, checking that the key belongs to the certificate.
    pub fn from_pem(cert_pem: &[u8], key_pem: &str) -> Result<Self, CertStoreError> {
        let certificate = Certificate::from_pem(cert_pem)?;
        let key = PrivateKey::from_pem(key_pem)?;
        if key.public_key() != certificate.public_key() {
            return Err(CertStoreError::KeyMismatch);
        }
        Ok(Self { certificate, key })
    }
}

/// Source of the host's credentials.
#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Return the host certificate and private key.
    ///
    /// # Returns
    /// * `Ok(credentials)` shared, never mutated
    /// * `Err(CertStoreError)` if the credentials cannot be produced; this is
    ///   a configuration error, not something the client caused
    async fn host_credentials(&self) -> Result<Arc<HostCredentials>, CertStoreError>;
}

/// Credentials already held in memory.
#[derive(Debug, Clone)]
pub struct StaticCertificateStore {
    credentials: Arc<HostCredentials>,
}

impl StaticCertificateStore {
    pub fn new(credentials: HostCredentials) -> Self {
        Self {
            credentials: Arc::new(credentials),
        }
    }
}

#[async_trait]
impl CertificateStore for StaticCertificateStore {
    async fn host_credentials(&self) -> Result<Arc<HostCredentials>, CertStoreError> {
        Ok(self.credentials.clone())
    }
}

/// Credentials read from PEM files on first use, then cached.
///
/// A failed load is not cached, so fixing the files on disk takes effect on
/// the next pairing attempt.
#[derive(Debug)]
pub struct FileCertificateStore {
    cert_path: PathBuf,
    key_path: PathBuf,
    cached: OnceCell<Arc<HostCredentials>>,
}

impl FileCertificateStore {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            cached: OnceCell::new(),
        }
    }

    async fn load(&self) -> Result<Arc<HostCredentials>, CertStoreError> {
        let cert_pem = read(&self.cert_path).await?;
        let key_pem = read(&self.key_path).await?;
        let key_pem = String::from_utf8_lossy(&key_pem);

        let credentials = HostCredentials::from_pem(&cert_pem, &key_pem)?;
        info!(
            cert = %self.cert_path.display(),
            fingerprint = %credentials.certificate.fingerprint(),
            "Loaded host credentials"
        );
        Ok(Arc::new(credentials))
    }
}

async fn read(path: &Path) -> Result<Vec<u8>, CertStoreError> {
    tokio::fs::read(path).await.map_err(|source| CertStoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[async_trait]
impl CertificateStore for FileCertificateStore {
    async fn host_credentials(&self) -> Result<Arc<HostCredentials>, CertStoreError> {
        self.cached
            .get_or_try_init(|| self.load())
            .await
            .map(Arc::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST_CERT: &str = include_str!("../../../testdata/host_cert.pem");
    const HOST_KEY: &str = include_str!("../../../testdata/host_key.pem");
    const ROGUE_KEY: &str = include_str!("../../../testdata/rogue_key.pem");

    #[test]
    fn test_credentials_from_matching_pem() {
        let creds = HostCredentials::from_pem(HOST_CERT.as_bytes(), HOST_KEY).unwrap();
        assert_eq!(creds.certificate.subject(), "CN=gsp-test-host");
    }

    #[test]
    fn test_mismatched_key_rejected() {
        let result = HostCredentials::from_pem(HOST_CERT.as_bytes(), ROGUE_KEY);
        assert!(matches!(result, Err(CertStoreError::KeyMismatch)));
    }

    #[tokio::test]
    async fn test_file_store_loads_once() {
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, HOST_CERT).unwrap();
        std::fs::write(&key_path, HOST_KEY).unwrap();

        let store = FileCertificateStore::new(&cert_path, &key_path);
        let first = store.host_credentials().await.unwrap();

        // Cached: removing the files does not matter any more
        std::fs::remove_file(&cert_path).unwrap();
        let second = store.host_credentials().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_file_store_missing_file() {
        let store = FileCertificateStore::new("/nonexistent/cert.pem", "/nonexistent/key.pem");
        let err = store.host_credentials().await.unwrap_err();
        assert!(matches!(err, CertStoreError::Io { .. }));
    }
}
