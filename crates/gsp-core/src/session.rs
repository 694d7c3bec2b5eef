//! Pairing session state.
//!
//! One [`PairingSession`] exists per in-flight pairing attempt, keyed by the
//! client's `uniqueid`. The stage enum carries exactly the data the next
//! phase needs, so a phase arriving out of order is caught by matching the
//! stage instead of finding a missing field.
//!
//! Locking: every access goes through a single `DashMap` entry guard, which
//! serializes requests for one client while leaving other clients
//! independent. Guards are never held across an `.await`, and callers keep
//! expensive work (RSA signing) outside them because a guard locks the whole
//! shard, not just one client.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::debug;
use zeroize::Zeroizing;

use gsp_crypto::cert::Certificate;

use crate::errors::{PhaseError, Reason, Rejected};
use crate::phases::{ServerSecrets, CLIENT_HASH_LEN, SECRET_LEN};

/// Observable state of a pairing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingClientChallenge,
    AwaitingClientResponse,
    AwaitingClientPairingSecret,
    Complete,
    Failed,
}

pub(crate) enum Stage {
    AwaitingClientChallenge,
    AwaitingClientResponse {
        secrets: ServerSecrets,
    },
    AwaitingClientPairingSecret {
        server_challenge: Zeroizing<[u8; SECRET_LEN]>,
        client_hash: Zeroizing<[u8; CLIENT_HASH_LEN]>,
    },
    Complete,
    Failed,
}

impl Stage {
    pub(crate) fn state(&self) -> SessionState {
        match self {
            Stage::AwaitingClientChallenge => SessionState::AwaitingClientChallenge,
            Stage::AwaitingClientResponse { .. } => SessionState::AwaitingClientResponse,
            Stage::AwaitingClientPairingSecret { .. } => SessionState::AwaitingClientPairingSecret,
            Stage::Complete => SessionState::Complete,
            Stage::Failed => SessionState::Failed,
        }
    }
}

pub struct PairingSession {
    client_id: String,
    aes_key: Zeroizing<[u8; 16]>,
    client_cert: Certificate,
    pub(crate) stage: Stage,
    last_activity: Instant,
}

impl PairingSession {
    pub(crate) fn new(
        client_id: &str,
        aes_key: Zeroizing<[u8; 16]>,
        client_cert: Certificate,
        now: Instant,
    ) -> Self {
        Self {
            client_id: client_id.to_string(),
            aes_key,
            client_cert,
            stage: Stage::AwaitingClientChallenge,
            last_activity: now,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_cert(&self) -> &Certificate {
        &self.client_cert
    }

    pub fn state(&self) -> SessionState {
        self.stage.state()
    }

    pub(crate) fn aes_key(&self) -> &[u8; 16] {
        &self.aes_key
    }

    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) > ttl
    }
}

impl fmt::Debug for PairingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairingSession")
            .field("client_id", &self.client_id)
            .field("state", &self.state())
            .field("client_cert", &self.client_cert)
            .finish_non_exhaustive()
    }
}

/// All in-flight pairing sessions.
pub struct SessionStore {
    sessions: DashMap<String, PairingSession>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// State of a live session, `None` if absent or expired.
    pub fn session_state(&self, client_id: &str) -> Option<SessionState> {
        let now = Instant::now();
        self.sessions
            .get(client_id)
            .filter(|s| !s.is_expired(now, self.ttl))
            .map(|s| s.state())
    }

    /// Insert a fresh session, discarding any previous one for the same client.
    ///
    /// # Returns
    /// `true` if an earlier session was replaced
    pub(crate) fn insert(&self, session: PairingSession) -> bool {
        self.sessions
            .insert(session.client_id.clone(), session)
            .is_some()
    }

    /// Run `f` on the live session for `client_id` under its entry guard.
    ///
    /// - `Ok`: the activity timestamp is refreshed.
    /// - A rejection that does not keep the session marks it `Failed` and
    ///   removes it.
    /// - Out-of-order rejections and hard errors leave it untouched.
    pub(crate) fn with_session<T>(
        &self,
        client_id: &str,
        now: Instant,
        f: impl FnOnce(&mut PairingSession) -> Result<T, PhaseError>,
    ) -> Result<T, PhaseError> {
        let outcome = {
            let Some(mut session) = self.sessions.get_mut(client_id) else {
                return Err(Reason::UnknownSession.into());
            };
            if session.is_expired(now, self.ttl) {
                None
            } else {
                let result = f(session.value_mut());
                match &result {
                    Ok(_) => session.last_activity = now,
                    Err(PhaseError::Rejected(Rejected(reason))) if !reason.keeps_session() => {
                        session.stage = Stage::Failed;
                    }
                    Err(_) => {}
                }
                Some(result)
            }
        };

        match outcome {
            None => {
                self.remove_expired(client_id, now);
                Err(Reason::Expired.into())
            }
            Some(result) => {
                if matches!(&result, Err(PhaseError::Rejected(Rejected(r))) if !r.keeps_session()) {
                    self.sessions
                        .remove_if(client_id, |_, s| matches!(s.stage, Stage::Failed));
                }
                result
            }
        }
    }

    /// Atomically remove the session for `client_id` if it is live and in
    /// `expected` state.
    ///
    /// Two concurrent callers cannot both obtain the same session.
    pub(crate) fn take(
        &self,
        client_id: &str,
        now: Instant,
        expected: SessionState,
    ) -> Result<PairingSession, Reason> {
        if let Some((_, session)) = self.sessions.remove_if(client_id, |_, s| {
            s.state() == expected && !s.is_expired(now, self.ttl)
        }) {
            return Ok(session);
        }

        let expired = match self.sessions.get(client_id) {
            None => return Err(Reason::UnknownSession),
            Some(s) => s.is_expired(now, self.ttl),
        };
        if expired {
            self.remove_expired(client_id, now);
            Err(Reason::Expired)
        } else {
            Err(Reason::OutOfOrder)
        }
    }

    /// Drop the session for `client_id`, whatever its state.
    pub fn remove(&self, client_id: &str) -> bool {
        self.sessions.remove(client_id).is_some()
    }

    fn remove_expired(&self, client_id: &str, now: Instant) {
        if self
            .sessions
            .remove_if(client_id, |_, s| s.is_expired(now, self.ttl))
            .is_some()
        {
            debug!(client_id = %client_id, "Discarded expired pairing session");
        }
    }

    /// Remove every session idle for longer than the TTL.
    pub fn evict_expired(&self) -> usize {
        self.evict_expired_at(Instant::now())
    }

    pub fn evict_expired_at(&self, now: Instant) -> usize {
        let mut evicted = 0;
        self.sessions.retain(|_, s| {
            let keep = !s.is_expired(now, self.ttl);
            if !keep {
                evicted += 1;
            }
            keep
        });
        if evicted > 0 {
            debug!(evicted, "Evicted expired pairing sessions");
        }
        evicted
    }

    /// Periodically evict expired sessions until the store is dropped.
    pub fn spawn_reaper(store: &Arc<SessionStore>, period: Duration) -> JoinHandle<()> {
        let weak: Weak<SessionStore> = Arc::downgrade(store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(store) => {
                        store.evict_expired();
                    }
                    None => break,
                }
            }
            debug!("Pairing session reaper stopped");
        })
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.sessions.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}
