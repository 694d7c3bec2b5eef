//! Error types for GSP Core.
//!
//! Two classes never mix:
//! - [`PairingError`]: hard failures the remote client did not cause (host
//!   certificate unavailable, registry write failed, no randomness) plus
//!   request-format errors. These reach the caller as `Err`.
//! - [`Rejected`]: a normal negative outcome of the protocol (wrong PIN,
//!   tampering, forged signature, out-of-order phase). It is rendered as
//!   `paired = 0` and its reason only ever reaches the logs.

use std::fmt;

use thiserror::Error;

use gsp_crypto::random::RngError;
use gsp_crypto::signing::SignatureError;

use crate::credentials::CertStoreError;
use crate::registry::RegistryError;

/// Hard errors surfaced to the caller of a pairing phase.
#[derive(Debug, Error)]
pub enum PairingError {
    /// Request is missing a field or carries an undecodable one
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Host certificate or key could not be loaded
    #[error("certificate store error: {0}")]
    CertificateStore(#[from] CertStoreError),

    /// Paired-client registry failed
    #[error("client registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Secure random source failed
    #[error(transparent)]
    Rng(#[from] RngError),

    /// Host private key could not produce a signature
    #[error("host signing failed: {0}")]
    Signing(#[from] SignatureError),
}

/// Why a pairing attempt was rejected. Internal to the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reason {
    UnknownSession,
    Expired,
    OutOfOrder,
    PinNotEntered,
    ChallengeUndecryptable,
    ResponseUndecryptable,
    MalformedPairingSecret,
    HashMismatch,
    BadClientSignature,
    HashAndSignatureMismatch,
    NotPaired,
}

impl Reason {
    /// Out-of-order requests leave the stored session untouched; every other
    /// rejection of a live session ends it.
    pub(crate) fn keeps_session(self) -> bool {
        matches!(self, Reason::OutOfOrder)
    }

    fn as_str(self) -> &'static str {
        match self {
            Reason::UnknownSession => "no pairing session for client",
            Reason::Expired => "pairing session expired",
            Reason::OutOfOrder => "phase requested out of order",
            Reason::PinNotEntered => "no PIN entered on host",
            Reason::ChallengeUndecryptable => "client challenge could not be decrypted",
            Reason::ResponseUndecryptable => "server challenge response could not be decrypted",
            Reason::MalformedPairingSecret => "client pairing secret malformed",
            Reason::HashMismatch => "client hash mismatch",
            Reason::BadClientSignature => "client secret signature invalid",
            Reason::HashAndSignatureMismatch => "client hash and signature both invalid",
            Reason::NotPaired => "client is not paired",
        }
    }
}

/// A protocol rejection.
///
/// Opaque on purpose: `Display` exists for logging, and nothing about it is
/// carried into a [`PairResponse`](crate::response::PairResponse).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejected(pub(crate) Reason);

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl From<Reason> for Rejected {
    fn from(reason: Reason) -> Self {
        Rejected(reason)
    }
}

/// Result of running a single phase: rejected, or failed hard.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("pairing rejected: {0}")]
    Rejected(Rejected),

    #[error(transparent)]
    Fatal(#[from] PairingError),
}

impl From<Rejected> for PhaseError {
    fn from(r: Rejected) -> Self {
        PhaseError::Rejected(r)
    }
}

impl From<Reason> for PhaseError {
    fn from(r: Reason) -> Self {
        PhaseError::Rejected(Rejected(r))
    }
}

impl From<RngError> for PhaseError {
    fn from(e: RngError) -> Self {
        PhaseError::Fatal(PairingError::Rng(e))
    }
}

impl From<SignatureError> for PhaseError {
    fn from(e: SignatureError) -> Self {
        PhaseError::Fatal(PairingError::Signing(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_out_of_order_keeps_session() {
        assert!(Reason::OutOfOrder.keeps_session());
        assert!(!Reason::HashMismatch.keeps_session());
        assert!(!Reason::ChallengeUndecryptable.keeps_session());
    }

    #[test]
    fn test_rejection_display_is_for_logs() {
        let r = Rejected(Reason::BadClientSignature);
        assert_eq!(r.to_string(), "client secret signature invalid");

        let e: PhaseError = r.into();
        assert!(matches!(e, PhaseError::Rejected(_)));
    }

    #[test]
    fn test_rng_failure_is_fatal() {
        let e: PhaseError = RngError::new("unavailable").into();
        assert!(matches!(e, PhaseError::Fatal(PairingError::Rng(_))));
    }
}
