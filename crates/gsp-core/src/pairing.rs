//! Host side of the pairing handshake.
//!
//! [`PairingHost`] drives the four phases against the session store:
//!
//! ```text
//! getservercert        -> AwaitingClientChallenge
//! clientchallenge      -> AwaitingClientResponse
//! serverchallengeresp  -> AwaitingClientPairingSecret
//! clientpairingsecret  -> Complete | Failed (session removed either way)
//! ```
//!
//! Every protocol rejection becomes `PairResponse::rejected()`; the reason is
//! logged and goes no further. Only [`PairingError`] reaches the caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use gsp_crypto::cert::Certificate;
use gsp_crypto::pairing::{Pin, SALT_LEN};
use gsp_crypto::random::{OsSecretSource, SecretSource};

use crate::config::PairingConfig;
use crate::credentials::CertificateStore;
use crate::dispatch::DispatchStats;
use crate::errors::{PairingError, PhaseError, Reason};
use crate::phases;
use crate::registry::ClientRegistry;
use crate::response::PairResponse;
use crate::session::{PairingSession, SessionState, SessionStore, Stage};

/// Server side of the GameStream pairing protocol.
pub struct PairingHost<C: CertificateStore, R: ClientRegistry> {
    sessions: Arc<SessionStore>,
    certs: Arc<C>,
    registry: Arc<R>,
    secrets: Arc<dyn SecretSource>,
    reaper_interval: Option<Duration>,
    stats: DispatchStats,
}

impl<C: CertificateStore, R: ClientRegistry> PairingHost<C, R> {
    pub fn new(certs: Arc<C>, registry: Arc<R>, config: &PairingConfig) -> Self {
        Self {
            sessions: Arc::new(SessionStore::new(config.session_ttl())),
            certs,
            registry,
            secrets: Arc::new(OsSecretSource),
            reaper_interval: config.reaper_interval(),
            stats: DispatchStats::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_secret_source(mut self, secrets: Arc<dyn SecretSource>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn registry(&self) -> &Arc<R> {
        &self.registry
    }

    /// Counters for requests handled through [`handle_query`](Self::handle_query).
    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// State of the live session for `client_id`, if any.
    pub fn session_state(&self, client_id: &str) -> Option<SessionState> {
        self.sessions.session_state(client_id)
    }

    /// Start the background reaper, unless disabled in configuration.
    ///
    /// Must be called from within a tokio runtime. The task ends on its own
    /// once the host is dropped.
    pub fn spawn_reaper(&self) -> Option<JoinHandle<()>> {
        self.reaper_interval
            .map(|period| SessionStore::spawn_reaper(&self.sessions, period))
    }

    // ------------------------------------------------------------------------
    // Phase 1
    // ------------------------------------------------------------------------

    /// Start (or restart) pairing for `client_id`.
    ///
    /// `pin` is what the user typed on the host; `salt` and
    /// `client_cert_pem` come from the request, already hex-decoded.
    pub async fn get_server_cert(
        &self,
        client_id: &str,
        pin: &Pin,
        salt: &[u8],
        client_cert_pem: &[u8],
    ) -> Result<PairResponse, PairingError> {
        let salt: [u8; SALT_LEN] = salt.try_into().map_err(|_| {
            PairingError::MalformedRequest(format!(
                "salt must be {SALT_LEN} bytes, got {}",
                salt.len()
            ))
        })?;
        let client_cert = Certificate::from_pem(client_cert_pem)
            .map_err(|e| PairingError::MalformedRequest(format!("clientcert: {e}")))?;

        let credentials = self.certs.host_credentials().await?;
        let (response, aes_key) = phases::get_server_cert(pin, &salt, credentials.certificate.pem());

        let fingerprint = client_cert.fingerprint();
        let replaced = self.sessions.insert(PairingSession::new(
            client_id,
            aes_key,
            client_cert,
            Instant::now(),
        ));
        info!(
            client_id = %client_id,
            client_cert = %fingerprint,
            replaced,
            "Pairing started"
        );
        Ok(response)
    }

    // ------------------------------------------------------------------------
    // Phase 2
    // ------------------------------------------------------------------------

    pub async fn handle_client_challenge(
        &self,
        client_id: &str,
        encrypted_challenge: &[u8],
    ) -> Result<PairResponse, PairingError> {
        let credentials = self.certs.host_credentials().await?;
        let source = self.secrets.as_ref();

        let result = self
            .sessions
            .with_session(client_id, Instant::now(), |session| {
                if !matches!(session.stage, Stage::AwaitingClientChallenge) {
                    return Err(Reason::OutOfOrder.into());
                }
                let (response, secrets) = phases::send_server_challenge(
                    session.aes_key(),
                    encrypted_challenge,
                    credentials.certificate.signature(),
                    source,
                )?;
                session.stage = Stage::AwaitingClientResponse { secrets };
                Ok(response)
            });
        self.finish(client_id, "clientchallenge", result)
    }

    // ------------------------------------------------------------------------
    // Phase 3
    // ------------------------------------------------------------------------

    /// Signing runs between two short visits to the session, never under
    /// its entry guard. The second visit only advances the session if it is
    /// still waiting on the same server secret.
    pub async fn handle_server_challenge_response(
        &self,
        client_id: &str,
        encrypted_response: &[u8],
    ) -> Result<PairResponse, PairingError> {
        const PHASE: &str = "serverchallengeresp";
        let credentials = self.certs.host_credentials().await?;

        let snapshot = self
            .sessions
            .with_session(client_id, Instant::now(), |session| match &session.stage {
                Stage::AwaitingClientResponse { secrets } => Ok((
                    Zeroizing::new(*session.aes_key()),
                    Zeroizing::new(secrets.server_secret),
                    Zeroizing::new(secrets.server_challenge),
                )),
                _ => Err(Reason::OutOfOrder.into()),
            });
        let (aes_key, server_secret, server_challenge) = match snapshot {
            Ok(snapshot) => snapshot,
            Err(e) => return self.finish(client_id, PHASE, Err(e)),
        };

        let outcome = phases::get_client_hash(
            &aes_key,
            &server_secret,
            encrypted_response,
            &credentials.key,
        );

        let result = self
            .sessions
            .with_session(client_id, Instant::now(), move |session| {
                match &session.stage {
                    Stage::AwaitingClientResponse { secrets }
                        if secrets.server_secret == *server_secret => {}
                    _ => return Err(Reason::OutOfOrder.into()),
                }
                let (response, client_hash) = outcome?;
                session.stage = Stage::AwaitingClientPairingSecret {
                    server_challenge,
                    client_hash,
                };
                Ok(response)
            });
        self.finish(client_id, PHASE, result)
    }

    // ------------------------------------------------------------------------
    // Phase 4
    // ------------------------------------------------------------------------

    /// Verify the client and, on success, record it in the registry.
    ///
    /// The session is removed before verification starts, so a repeated
    /// request cannot be verified twice.
    pub async fn handle_client_pairing_secret(
        &self,
        client_id: &str,
        client_pairing_secret: &[u8],
    ) -> Result<PairResponse, PairingError> {
        const PHASE: &str = "clientpairingsecret";

        let mut session = match self.sessions.take(
            client_id,
            Instant::now(),
            SessionState::AwaitingClientPairingSecret,
        ) {
            Ok(session) => session,
            Err(reason) => return self.finish(client_id, PHASE, Err(reason.into())),
        };

        let verdict = match &session.stage {
            Stage::AwaitingClientPairingSecret {
                server_challenge,
                client_hash,
            } => phases::client_pair(
                server_challenge,
                client_hash,
                client_pairing_secret,
                session.client_cert().signature(),
                session.client_cert().public_key(),
            ),
            _ => Err(Reason::OutOfOrder.into()),
        };

        match verdict {
            Ok(response) => {
                if let Err(e) = self
                    .registry
                    .add_paired_client(client_id, session.client_cert())
                    .await
                {
                    return self.finish(client_id, PHASE, Err(PairingError::from(e).into()));
                }
                session.stage = Stage::Complete;
                info!(
                    client_id = %client_id,
                    client_cert = %session.client_cert().fingerprint(),
                    "Client paired"
                );
                Ok(response)
            }
            Err(rejected) => {
                session.stage = Stage::Failed;
                self.finish(client_id, PHASE, Err(rejected.into()))
            }
        }
    }

    // ------------------------------------------------------------------------
    // Confirmation
    // ------------------------------------------------------------------------

    /// Answer `phrase=pairchallenge`: whether `client_id` is paired.
    pub async fn handle_pair_challenge(&self, client_id: &str) -> Result<PairResponse, PairingError> {
        let result = if self.registry.is_paired(client_id).await? {
            Ok(PairResponse::paired())
        } else {
            Err(Reason::NotPaired.into())
        };
        self.finish(client_id, "pairchallenge", result)
    }

    pub(crate) fn finish(
        &self,
        client_id: &str,
        phase: &'static str,
        result: Result<PairResponse, PhaseError>,
    ) -> Result<PairResponse, PairingError> {
        match result {
            Ok(response) => {
                debug!(client_id = %client_id, phase, "Pairing phase completed");
                Ok(response)
            }
            Err(PhaseError::Rejected(reason)) => {
                warn!(client_id = %client_id, phase, %reason, "Pairing rejected");
                Ok(PairResponse::rejected())
            }
            Err(PhaseError::Fatal(e)) => {
                error!(client_id = %client_id, phase, error = %e, "Pairing phase failed");
                Err(e)
            }
        }
    }
}
