//! X.509 certificate handling.
//!
//! Certificates travel as PEM (hex-encoded on the wire). The handshake needs
//! three things out of them: the PEM itself to hand back to the peer, the
//! signature value (bound into the challenge hashes) and the RSA subject
//! public key (used to check pairing-secret signatures).
//!
//! # Security
//!
//! - Input is limited to 16KB to prevent DoS
//! - ASN.1 parsing is delegated to `x509_parser`

use std::fmt;

use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::*;

use crate::hash::fingerprint;

/// Maximum certificate size (16KB is generous for a single cert)
pub const MAX_CERT_SIZE: usize = 16 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum CertError {
    #[error("certificate too large: {0} bytes (max {MAX_CERT_SIZE})")]
    TooLarge(usize),

    #[error("invalid PEM: {0}")]
    Pem(String),

    #[error("unexpected PEM label: {0}")]
    Label(String),

    #[error("failed to parse X.509 certificate: {0}")]
    Parse(String),

    #[error("certificate does not carry an RSA public key: {0}")]
    UnsupportedKey(String),
}

/// A parsed certificate, owning everything the handshake reads from it.
#[derive(Clone)]
pub struct Certificate {
    pem: Vec<u8>,
    der: Vec<u8>,
    signature: Vec<u8>,
    subject: String,
    public_key: RsaPublicKey,
}

impl Certificate {
    /// Parse a single PEM-encoded certificate.
    pub fn from_pem(pem: &[u8]) -> Result<Self, CertError> {
        if pem.len() > MAX_CERT_SIZE {
            return Err(CertError::TooLarge(pem.len()));
        }

        let (_, block) = parse_x509_pem(pem).map_err(|e| CertError::Pem(e.to_string()))?;
        if block.label != "CERTIFICATE" {
            return Err(CertError::Label(block.label));
        }

        let (_, cert) = X509Certificate::from_der(&block.contents)
            .map_err(|e| CertError::Parse(format!("{:?}", e)))?;

        let public_key = RsaPublicKey::from_public_key_der(cert.public_key().raw)
            .map_err(|e| CertError::UnsupportedKey(e.to_string()))?;

        Ok(Self {
            pem: pem.to_vec(),
            der: block.contents.clone(),
            signature: cert.signature_value.data.to_vec(),
            subject: cert.subject().to_string(),
            public_key,
        })
    }

    /// The certificate exactly as supplied, PEM armour included.
    pub fn pem(&self) -> &[u8] {
        &self.pem
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Raw signature value of the certificate (not the TBS data).
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// sha256(der) as lowercase hex.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.der)
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST_CERT: &str = include_str!("../../../testdata/host_cert.pem");
    const HOST_KEY: &str = include_str!("../../../testdata/host_key.pem");

    #[test]
    fn test_parse_fixture() {
        let cert = Certificate::from_pem(HOST_CERT.as_bytes()).unwrap();
        assert_eq!(cert.subject(), "CN=gsp-test-host");
        // RSA-2048 signature value
        assert_eq!(cert.signature().len(), 256);
        assert_eq!(cert.pem(), HOST_CERT.as_bytes());
        assert_eq!(cert.fingerprint().len(), 64);
    }

    #[test]
    fn test_cert_too_large() {
        let large_data = vec![b'A'; MAX_CERT_SIZE + 1];
        let result = Certificate::from_pem(&large_data);
        assert!(matches!(result, Err(CertError::TooLarge(_))));
    }

    #[test]
    fn test_invalid_pem() {
        let result = Certificate::from_pem(b"not a certificate");
        assert!(matches!(result, Err(CertError::Pem(_))));
    }

    #[test]
    fn test_private_key_is_not_a_certificate() {
        let result = Certificate::from_pem(HOST_KEY.as_bytes());
        assert!(matches!(result, Err(CertError::Label(_))));
    }
}
