//! Test harness for the pairing handshake.
//!
//! Drives a [`PairingClient`] against a [`PairingHost`] through the same
//! query-parameter path a real `/pair` endpoint uses.

use async_trait::async_trait;
use thiserror::Error;

use gsp_crypto::pairing::Pin;

use crate::client::{ClientError, PairingClient};
use crate::credentials::CertificateStore;
use crate::dispatch::PinPrompt;
use crate::errors::PairingError;
use crate::pairing::PairingHost;
use crate::registry::ClientRegistry;
use crate::response::PairResponse;

/// PIN prompt that always answers with the same PIN.
pub struct FixedPin(pub Pin);

#[async_trait]
impl PinPrompt for FixedPin {
    async fn request_pin(&self, _client_id: &str) -> Option<Pin> {
        Some(self.0.clone())
    }
}

/// PIN prompt the user never answers.
pub struct NoPin;

#[async_trait]
impl PinPrompt for NoPin {
    async fn request_pin(&self, _client_id: &str) -> Option<Pin> {
        None
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("host failed: {0}")]
    Host(#[from] PairingError),

    #[error("client failed: {0}")]
    Client(#[from] ClientError),
}

/// How a simulated pairing attempt ended.
#[derive(Debug)]
pub enum FlowOutcome {
    /// All four phases succeeded and the host confirms the pairing
    Paired,
    /// The host answered `paired = 0` (or 400) to this phase
    RejectedByHost { phase: &'static str },
    /// The client refused to continue because the host failed verification
    HostNotTrusted(ClientError),
}

impl FlowOutcome {
    pub fn is_paired(&self) -> bool {
        matches!(self, FlowOutcome::Paired)
    }
}

/// Run a complete pairing attempt, phase 1 through `pairchallenge`.
pub async fn run_pairing_flow<C, R>(
    host: &PairingHost<C, R>,
    prompt: &dyn PinPrompt,
    client_id: &str,
    client: &mut PairingClient,
) -> Result<FlowOutcome, HarnessError>
where
    C: CertificateStore,
    R: ClientRegistry,
{
    macro_rules! exchange {
        ($phase:literal, $query:expr) => {{
            let response: PairResponse = host.handle_query(&$query, prompt).await?;
            if !response.is_paired() {
                return Ok(FlowOutcome::RejectedByHost { phase: $phase });
            }
            response
        }};
    }

    let response = exchange!("getservercert", client.get_server_cert_query(client_id));
    client.handle_server_cert(&response)?;

    let response = exchange!("clientchallenge", client.client_challenge_query(client_id)?);
    let query = client.server_challenge_response_query(client_id, &response)?;

    let response = exchange!("serverchallengeresp", query);
    match client.handle_pairing_secret(&response) {
        Ok(()) => {}
        Err(e @ (ClientError::HostSignature | ClientError::HostHashMismatch)) => {
            return Ok(FlowOutcome::HostNotTrusted(e));
        }
        Err(e) => return Err(e.into()),
    }

    exchange!("clientpairingsecret", client.client_pairing_secret_query(client_id)?);
    exchange!("pairchallenge", client.pair_challenge_query(client_id));
    Ok(FlowOutcome::Paired)
}
