//! Reference pairing client.
//!
//! Plays the client side of the handshake exactly as GameStream clients do,
//! including verification of the host. Used by the test harness and by the
//! operator `simulate` command to exercise a host end to end.

use std::collections::HashMap;

use thiserror::Error;
use zeroize::Zeroizing;

use gsp_crypto::cert::{CertError, Certificate};
use gsp_crypto::cipher::AesEcb;
use gsp_crypto::hash::sha256_concat;
use gsp_crypto::pairing::{Pin, SALT_LEN};
use gsp_crypto::random::{OsSecretSource, RngError, SecretSource};
use gsp_crypto::signing::{verify_signature, KeyError, PrivateKey, SignatureError};
use gsp_crypto::utils::constant_time_compare;

use crate::phases::{CLIENT_HASH_LEN, SECRET_LEN};
use crate::response::PairResponse;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("host rejected the request")]
    Rejected,

    #[error("response lacks {0}")]
    MissingField(&'static str),

    #[error("response field {0} is malformed")]
    Malformed(&'static str),

    #[error("host certificate invalid: {0}")]
    Certificate(#[from] CertError),

    #[error("client key invalid: {0}")]
    Key(#[from] KeyError),

    #[error(transparent)]
    Rng(#[from] RngError),

    #[error("client signing failed: {0}")]
    Signing(#[from] SignatureError),

    #[error("host signature over its pairing secret is invalid")]
    HostSignature,

    /// The host's challenge hash does not match; the PINs differ or the
    /// host is not the one that sent its certificate.
    #[error("host challenge hash mismatch")]
    HostHashMismatch,

    #[error("client used out of order: {0}")]
    OutOfOrder(&'static str),
}

/// State the client accumulates over the four phases.
pub struct PairingClient {
    cert: Certificate,
    key: PrivateKey,
    salt: [u8; SALT_LEN],
    cipher: AesEcb,
    client_secret: Zeroizing<[u8; SECRET_LEN]>,
    secrets: Box<dyn SecretSource>,
    server_cert: Option<Certificate>,
    client_challenge: Option<Zeroizing<[u8; SECRET_LEN]>>,
    server_hash: Option<Zeroizing<[u8; CLIENT_HASH_LEN]>>,
}

impl PairingClient {
    /// Create a client with fresh random salt and client secret.
    pub fn new(cert_pem: &str, key_pem: &str, pin: Pin) -> Result<Self, ClientError> {
        Self::with_secret_source(cert_pem, key_pem, pin, Box::new(OsSecretSource))
    }

    pub fn with_secret_source(
        cert_pem: &str,
        key_pem: &str,
        pin: Pin,
        secrets: Box<dyn SecretSource>,
    ) -> Result<Self, ClientError> {
        let cert = Certificate::from_pem(cert_pem.as_bytes())?;
        let key = PrivateKey::from_pem(key_pem)?;
        let salt = secrets.secret16()?;
        let client_secret = Zeroizing::new(secrets.secret16()?);
        let cipher = AesEcb::new(pin.derive_key(&salt));

        Ok(Self {
            cert,
            key,
            salt,
            cipher,
            client_secret,
            secrets,
            server_cert: None,
            client_challenge: None,
            server_hash: None,
        })
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    pub fn cert_pem(&self) -> &[u8] {
        self.cert.pem()
    }

    pub fn server_cert(&self) -> Option<&Certificate> {
        self.server_cert.as_ref()
    }

    // Query builders, one per phase

    pub fn get_server_cert_query(&self, client_id: &str) -> HashMap<String, String> {
        query(
            client_id,
            &[
                ("phrase", "getservercert".to_string()),
                ("salt", hex::encode(self.salt)),
                ("clientcert", hex::encode(self.cert.pem())),
            ],
        )
    }

    pub fn client_challenge_query(&mut self, client_id: &str) -> Result<HashMap<String, String>, ClientError> {
        let challenge = self.client_challenge()?;
        Ok(query(client_id, &[("clientchallenge", hex::encode(challenge))]))
    }

    pub fn server_challenge_response_query(
        &mut self,
        client_id: &str,
        response: &PairResponse,
    ) -> Result<HashMap<String, String>, ClientError> {
        let encrypted = self.handle_challenge_response(response)?;
        Ok(query(
            client_id,
            &[("serverchallengeresp", hex::encode(encrypted))],
        ))
    }

    pub fn client_pairing_secret_query(&self, client_id: &str) -> Result<HashMap<String, String>, ClientError> {
        let secret = self.client_pairing_secret()?;
        Ok(query(
            client_id,
            &[("clientpairingsecret", hex::encode(secret))],
        ))
    }

    pub fn pair_challenge_query(&self, client_id: &str) -> HashMap<String, String> {
        query(client_id, &[("phrase", "pairchallenge".to_string())])
    }

    // Phase handling

    /// Phase 1 response: keep the host certificate.
    pub fn handle_server_cert(&mut self, response: &PairResponse) -> Result<(), ClientError> {
        check_paired(response)?;
        let pem = decode_field(response.plaincert.as_deref(), "plaincert")?;
        self.server_cert = Some(Certificate::from_pem(&pem)?);
        Ok(())
    }

    /// Phase 2 request: a fresh challenge, encrypted with the pairing key.
    pub fn client_challenge(&mut self) -> Result<Vec<u8>, ClientError> {
        let challenge = Zeroizing::new(self.secrets.secret16()?);
        let encrypted = self
            .cipher
            .encrypt(&*challenge)
            .map_err(|_| ClientError::Malformed("clientchallenge"))?;
        self.client_challenge = Some(challenge);
        Ok(encrypted)
    }

    /// Phase 2 response in, phase 3 request out.
    ///
    /// Records the host's hash for checking once its secret arrives, and
    /// answers the host's challenge with
    /// `SHA256(server_challenge || client_cert_sig || client_secret)`.
    pub fn handle_challenge_response(&mut self, response: &PairResponse) -> Result<Vec<u8>, ClientError> {
        check_paired(response)?;
        let encrypted = decode_field(response.challengeresponse.as_deref(), "challengeresponse")?;
        let plain = Zeroizing::new(
            self.cipher
                .decrypt(&encrypted)
                .map_err(|_| ClientError::Malformed("challengeresponse"))?,
        );
        if plain.len() < CLIENT_HASH_LEN + SECRET_LEN {
            return Err(ClientError::Malformed("challengeresponse"));
        }

        let mut server_hash = Zeroizing::new([0u8; CLIENT_HASH_LEN]);
        server_hash.copy_from_slice(&plain[..CLIENT_HASH_LEN]);
        self.server_hash = Some(server_hash);

        let server_challenge = &plain[CLIENT_HASH_LEN..CLIENT_HASH_LEN + SECRET_LEN];
        let hash = Zeroizing::new(sha256_concat(&[
            server_challenge,
            self.cert.signature(),
            &*self.client_secret,
        ]));
        self.cipher
            .encrypt(&*hash)
            .map_err(|_| ClientError::Malformed("challengeresponse"))
    }

    /// Phase 3 response: authenticate the host.
    ///
    /// The host must have signed its secret with the key of the certificate
    /// it sent in phase 1, and the secret must reproduce the hash it sent in
    /// phase 2.
    pub fn handle_pairing_secret(&self, response: &PairResponse) -> Result<(), ClientError> {
        check_paired(response)?;
        let server_cert = self
            .server_cert
            .as_ref()
            .ok_or(ClientError::OutOfOrder("no host certificate yet"))?;
        let challenge = self
            .client_challenge
            .as_ref()
            .ok_or(ClientError::OutOfOrder("no client challenge sent"))?;
        let server_hash = self
            .server_hash
            .as_ref()
            .ok_or(ClientError::OutOfOrder("no challenge response recorded"))?;

        let secret = decode_field(response.pairingsecret.as_deref(), "pairingsecret")?;
        if secret.len() <= SECRET_LEN {
            return Err(ClientError::Malformed("pairingsecret"));
        }
        let (server_secret, signature) = secret.split_at(SECRET_LEN);

        verify_signature(server_cert.public_key(), server_secret, signature)
            .map_err(|_| ClientError::HostSignature)?;

        let expected = sha256_concat(&[&**challenge, server_cert.signature(), server_secret]);
        if !constant_time_compare(&expected, &**server_hash) {
            return Err(ClientError::HostHashMismatch);
        }
        Ok(())
    }

    /// Phase 4 request: `client_secret || sign(client_secret)`.
    pub fn client_pairing_secret(&self) -> Result<Vec<u8>, ClientError> {
        let signature = self.key.sign(&*self.client_secret)?;
        let mut out = Vec::with_capacity(SECRET_LEN + signature.len());
        out.extend_from_slice(&*self.client_secret);
        out.extend_from_slice(&signature);
        Ok(out)
    }
}

impl std::fmt::Debug for PairingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingClient")
            .field("cert", &self.cert)
            .finish_non_exhaustive()
    }
}

fn query(client_id: &str, fields: &[(&str, String)]) -> HashMap<String, String> {
    let mut params = HashMap::with_capacity(fields.len() + 1);
    params.insert("uniqueid".to_string(), client_id.to_string());
    for (name, value) in fields {
        params.insert(name.to_string(), value.clone());
    }
    params
}

fn check_paired(response: &PairResponse) -> Result<(), ClientError> {
    if response.is_paired() {
        Ok(())
    } else {
        Err(ClientError::Rejected)
    }
}

fn decode_field(value: Option<&str>, name: &'static str) -> Result<Vec<u8>, ClientError> {
    let value = value.ok_or(ClientError::MissingField(name))?;
    hex::decode(value).map_err(|_| ClientError::Malformed(name))
}
