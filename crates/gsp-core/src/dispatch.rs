//! `/pair` request dispatch.
//!
//! Maps query parameters to a pairing phase and routes it to the
//! [`PairingHost`]. Request-format errors render as `status_code = 400`;
//! everything the client could have caused by misbehaving renders as a
//! plain rejection; only host-side failures surface as `Err`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use gsp_crypto::pairing::Pin;

use crate::credentials::CertificateStore;
use crate::errors::{PairingError, Reason};
use crate::pairing::PairingHost;
use crate::registry::ClientRegistry;
use crate::response::PairResponse;

// ============================================================================
// Error Types
// ============================================================================

/// Why a query could not be turned into a [`PairRequest`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("field {0} is not valid hex")]
    InvalidHex(&'static str),

    #[error("unknown phrase: {0}")]
    UnknownPhrase(String),

    #[error("request names no pairing phase")]
    NoPhase,
}

impl From<DispatchError> for PairingError {
    fn from(e: DispatchError) -> Self {
        PairingError::MalformedRequest(e.to_string())
    }
}

// ============================================================================
// Request
// ============================================================================

/// A decoded `/pair` request.
#[derive(Clone, PartialEq, Eq)]
pub enum PairRequest {
    GetServerCert {
        client_id: String,
        salt: Vec<u8>,
        client_cert: Vec<u8>,
    },
    ClientChallenge {
        client_id: String,
        challenge: Vec<u8>,
    },
    ServerChallengeResponse {
        client_id: String,
        response: Vec<u8>,
    },
    ClientPairingSecret {
        client_id: String,
        pairing_secret: Vec<u8>,
    },
    PairChallenge {
        client_id: String,
    },
}

impl PairRequest {
    /// Decode query parameters.
    ///
    /// `phrase` wins when present; otherwise the first of `clientchallenge`,
    /// `serverchallengeresp`, `clientpairingsecret` found selects the phase.
    /// Unrelated parameters (`devicename`, `updateState`, ...) are ignored.
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self, DispatchError> {
        let client_id = required(params, "uniqueid")?.to_string();

        if let Some(phrase) = params.get("phrase") {
            return match phrase.as_str() {
                "getservercert" => Ok(PairRequest::GetServerCert {
                    client_id,
                    salt: hex_field(params, "salt")?,
                    client_cert: hex_field(params, "clientcert")?,
                }),
                "pairchallenge" => Ok(PairRequest::PairChallenge { client_id }),
                other => Err(DispatchError::UnknownPhrase(other.to_string())),
            };
        }

        if params.contains_key("clientchallenge") {
            Ok(PairRequest::ClientChallenge {
                client_id,
                challenge: hex_field(params, "clientchallenge")?,
            })
        } else if params.contains_key("serverchallengeresp") {
            Ok(PairRequest::ServerChallengeResponse {
                client_id,
                response: hex_field(params, "serverchallengeresp")?,
            })
        } else if params.contains_key("clientpairingsecret") {
            Ok(PairRequest::ClientPairingSecret {
                client_id,
                pairing_secret: hex_field(params, "clientpairingsecret")?,
            })
        } else {
            Err(DispatchError::NoPhase)
        }
    }

    pub fn client_id(&self) -> &str {
        match self {
            PairRequest::GetServerCert { client_id, .. }
            | PairRequest::ClientChallenge { client_id, .. }
            | PairRequest::ServerChallengeResponse { client_id, .. }
            | PairRequest::ClientPairingSecret { client_id, .. }
            | PairRequest::PairChallenge { client_id } => client_id,
        }
    }

    /// Wire name of the phase, for logs.
    pub fn phase(&self) -> &'static str {
        match self {
            PairRequest::GetServerCert { .. } => "getservercert",
            PairRequest::ClientChallenge { .. } => "clientchallenge",
            PairRequest::ServerChallengeResponse { .. } => "serverchallengeresp",
            PairRequest::ClientPairingSecret { .. } => "clientpairingsecret",
            PairRequest::PairChallenge { .. } => "pairchallenge",
        }
    }
}

impl std::fmt::Debug for PairRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairRequest")
            .field("phase", &self.phase())
            .field("client_id", &self.client_id())
            .finish_non_exhaustive()
    }
}

fn required<'a>(
    params: &'a HashMap<String, String>,
    name: &'static str,
) -> Result<&'a str, DispatchError> {
    params
        .get(name)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or(DispatchError::MissingField(name))
}

fn hex_field(params: &HashMap<String, String>, name: &'static str) -> Result<Vec<u8>, DispatchError> {
    hex::decode(required(params, name)?).map_err(|_| DispatchError::InvalidHex(name))
}

// ============================================================================
// PIN Prompt
// ============================================================================

/// Source of the PIN the user types on the host.
///
/// Asked once per phase-1 request. `None` means no PIN was entered (the
/// prompt was dismissed or timed out) and the attempt is rejected.
#[async_trait]
pub trait PinPrompt: Send + Sync {
    async fn request_pin(&self, client_id: &str) -> Option<Pin>;
}

// ============================================================================
// Dispatch Statistics
// ============================================================================

/// Counters for dispatched pairing requests.
#[derive(Debug, Default)]
pub struct DispatchStats {
    received: AtomicU64,
    bad_requests: AtomicU64,
    rejected: AtomicU64,
    paired: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchStatsSnapshot {
    pub received: u64,
    pub bad_requests: u64,
    pub rejected: u64,
    pub paired: u64,
    /// Requests that ended in a host-side error
    pub failed: u64,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            bad_requests: self.bad_requests.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            paired: self.paired.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn record(&self, response: &PairResponse, completes_pairing: bool) {
        if response.status_code != crate::response::STATUS_OK {
            self.bad_requests.fetch_add(1, Ordering::Relaxed);
        } else if !response.is_paired() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
        } else if completes_pairing {
            self.paired.fetch_add(1, Ordering::Relaxed);
        }
    }
}

// ============================================================================
// Dispatch
// ============================================================================

impl<C: CertificateStore, R: ClientRegistry> PairingHost<C, R> {
    /// Route a decoded request to its phase.
    pub async fn dispatch(
        &self,
        request: PairRequest,
        prompt: &dyn PinPrompt,
    ) -> Result<PairResponse, PairingError> {
        debug!(client_id = %request.client_id(), phase = request.phase(), "Dispatching pairing request");
        match request {
            PairRequest::GetServerCert {
                client_id,
                salt,
                client_cert,
            } => match prompt.request_pin(&client_id).await {
                Some(pin) => self.get_server_cert(&client_id, &pin, &salt, &client_cert).await,
                None => self.finish(&client_id, "getservercert", Err(Reason::PinNotEntered.into())),
            },
            PairRequest::ClientChallenge {
                client_id,
                challenge,
            } => self.handle_client_challenge(&client_id, &challenge).await,
            PairRequest::ServerChallengeResponse {
                client_id,
                response,
            } => {
                self.handle_server_challenge_response(&client_id, &response)
                    .await
            }
            PairRequest::ClientPairingSecret {
                client_id,
                pairing_secret,
            } => {
                self.handle_client_pairing_secret(&client_id, &pairing_secret)
                    .await
            }
            PairRequest::PairChallenge { client_id } => self.handle_pair_challenge(&client_id).await,
        }
    }

    /// Handle a raw `/pair` query end to end.
    ///
    /// # Returns
    /// * `Ok(response)` for every outcome the client caused, including
    ///   malformed requests (`status_code = 400`)
    /// * `Err(PairingError)` only for host-side failures
    pub async fn handle_query(
        &self,
        params: &HashMap<String, String>,
        prompt: &dyn PinPrompt,
    ) -> Result<PairResponse, PairingError> {
        self.stats().received.fetch_add(1, Ordering::Relaxed);
        let request = match PairRequest::from_query(params) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Malformed pairing request");
                let response = PairResponse::bad_request();
                self.stats().record(&response, false);
                return Ok(response);
            }
        };

        let completes_pairing = matches!(request, PairRequest::ClientPairingSecret { .. });
        let client_id = request.client_id().to_string();
        let response = match self.dispatch(request, prompt).await {
            Ok(response) => response,
            Err(PairingError::MalformedRequest(reason)) => {
                warn!(client_id = %client_id, %reason, "Malformed pairing request");
                PairResponse::bad_request()
            }
            Err(e) => {
                self.stats().failed.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };
        self.stats().record(&response, completes_pairing);
        Ok(response)
    }
}
