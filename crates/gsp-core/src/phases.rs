//! The four pairing phases as pure functions.
//!
//! Nothing here touches shared state: every input is passed in and every
//! output handed back, which is what lets the session layer run them under
//! a single entry guard. Rejections carry an internal reason; the only hard
//! failures are the random source and host-side signing.

use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use gsp_crypto::cipher::AesEcb;
use gsp_crypto::hash::sha256_concat;
use gsp_crypto::pairing::{Pin, SALT_LEN};
use gsp_crypto::random::{RngError, SecretSource};
use gsp_crypto::signing::{verify_signature, PrivateKey, RsaPublicKey};
use gsp_crypto::utils::constant_time_compare;

use crate::errors::{PhaseError, Reason, Rejected};
use crate::response::PairResponse;

pub const SECRET_LEN: usize = 16;
pub const CLIENT_HASH_LEN: usize = 32;

/// Host-generated values of phase 2, needed again in phases 3 and 4.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ServerSecrets {
    pub server_secret: [u8; SECRET_LEN],
    pub server_challenge: [u8; SECRET_LEN],
}

impl ServerSecrets {
    pub fn generate(source: &dyn SecretSource) -> Result<Self, RngError> {
        Ok(Self {
            server_secret: source.secret16()?,
            server_challenge: source.secret16()?,
        })
    }
}

impl std::fmt::Debug for ServerSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ServerSecrets(..)")
    }
}

/// Phase 1: hand out the host certificate and derive the pairing key.
///
/// Total: validation of the salt and client certificate happens before this
/// is reached.
pub fn get_server_cert(
    pin: &Pin,
    salt: &[u8; SALT_LEN],
    server_cert_pem: &[u8],
) -> (PairResponse, Zeroizing<[u8; 16]>) {
    let aes_key = Zeroizing::new(pin.derive_key(salt));
    let response = PairResponse::paired().with_plaincert(hex::encode(server_cert_pem));
    (response, aes_key)
}

/// Phase 2: answer the client's challenge and issue the host's own.
///
/// challengeresponse = AES(SHA256(challenge || server_cert_sig || server_secret) || server_challenge)
pub fn send_server_challenge(
    aes_key: &[u8; 16],
    encrypted_challenge: &[u8],
    server_cert_signature: &[u8],
    source: &dyn SecretSource,
) -> Result<(PairResponse, ServerSecrets), PhaseError> {
    let cipher = AesEcb::new(*aes_key);
    let challenge = Zeroizing::new(
        cipher
            .decrypt(encrypted_challenge)
            .map_err(|_| Reason::ChallengeUndecryptable)?,
    );

    let secrets = ServerSecrets::generate(source)?;
    let hash = Zeroizing::new(sha256_concat(&[
        &challenge,
        server_cert_signature,
        &secrets.server_secret,
    ]));

    let mut plaintext = Zeroizing::new(Vec::with_capacity(hash.len() + SECRET_LEN));
    plaintext.extend_from_slice(&*hash);
    plaintext.extend_from_slice(&secrets.server_challenge);

    // 48 bytes, always block-aligned
    let encrypted = cipher
        .encrypt(&plaintext)
        .map_err(|_| Reason::ChallengeUndecryptable)?;

    let response = PairResponse::paired().with_challenge_response(hex::encode(encrypted));
    Ok((response, secrets))
}

/// Phase 3: recover the client's hash and prove ownership of the host key.
///
/// pairingsecret = server_secret || sign(server_secret)
pub fn get_client_hash(
    aes_key: &[u8; 16],
    server_secret: &[u8; SECRET_LEN],
    encrypted_response: &[u8],
    host_key: &PrivateKey,
) -> Result<(PairResponse, Zeroizing<[u8; CLIENT_HASH_LEN]>), PhaseError> {
    let cipher = AesEcb::new(*aes_key);
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(encrypted_response)
            .map_err(|_| Reason::ResponseUndecryptable)?,
    );
    if plaintext.len() < CLIENT_HASH_LEN {
        return Err(Reason::ResponseUndecryptable.into());
    }

    let mut client_hash = Zeroizing::new([0u8; CLIENT_HASH_LEN]);
    client_hash.copy_from_slice(&plaintext[..CLIENT_HASH_LEN]);

    let signature = host_key.sign(server_secret)?;
    let mut pairing_secret = Vec::with_capacity(SECRET_LEN + signature.len());
    pairing_secret.extend_from_slice(server_secret);
    pairing_secret.extend_from_slice(&signature);

    let response = PairResponse::paired().with_pairing_secret(hex::encode(pairing_secret));
    Ok((response, client_hash))
}

/// Phase 4: verify the client knows the PIN and owns its certificate.
///
/// Both checks always run, so timing does not reveal which one failed.
pub fn client_pair(
    server_challenge: &[u8; SECRET_LEN],
    client_hash: &[u8; CLIENT_HASH_LEN],
    client_pairing_secret: &[u8],
    client_cert_signature: &[u8],
    client_public_key: &RsaPublicKey,
) -> Result<PairResponse, Rejected> {
    if client_pairing_secret.len() <= SECRET_LEN {
        return Err(Reason::MalformedPairingSecret.into());
    }
    let (client_secret, signature) = client_pairing_secret.split_at(SECRET_LEN);

    let expected = Zeroizing::new(sha256_concat(&[
        server_challenge,
        client_cert_signature,
        client_secret,
    ]));
    let hash_ok = constant_time_compare(&*expected, client_hash);
    let signature_ok = verify_signature(client_public_key, client_secret, signature).is_ok();

    match (hash_ok, signature_ok) {
        (true, true) => Ok(PairResponse::paired()),
        (false, true) => Err(Reason::HashMismatch.into()),
        (true, false) => Err(Reason::BadClientSignature.into()),
        (false, false) => Err(Reason::HashAndSignatureMismatch.into()),
    }
}
