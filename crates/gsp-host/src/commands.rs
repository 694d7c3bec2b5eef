//! Operator commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use gsp_core::client::PairingClient;
use gsp_core::harness::{run_pairing_flow, FixedPin, FlowOutcome};
use gsp_core::{
    CertificateStore, ClientRegistry, FileCertificateStore, JsonFileRegistry, PairedClient,
    PairingHost,
};
use gsp_crypto::cert::Certificate;
use gsp_crypto::pairing::Pin;

use crate::config::HostConfig;

/// Print the host certificate's subject and fingerprint.
pub async fn show_cert(config: &HostConfig) -> anyhow::Result<()> {
    let store = FileCertificateStore::new(&config.cert_path, &config.key_path);
    let credentials = store
        .host_credentials()
        .await
        .context("failed to load host credentials")?;

    println!("subject:     {}", credentials.certificate.subject());
    println!("fingerprint: {}", credentials.certificate.fingerprint());
    Ok(())
}

/// One row of `clients list`.
#[derive(Debug, serde::Serialize)]
pub struct ClientSummary {
    pub client_id: String,
    pub paired_at: u64,
    /// `None` if the stored certificate no longer parses
    pub fingerprint: Option<String>,
}

impl From<&PairedClient> for ClientSummary {
    fn from(client: &PairedClient) -> Self {
        Self {
            client_id: client.client_id.clone(),
            paired_at: client.paired_at,
            fingerprint: Certificate::from_pem(client.cert_pem.as_bytes())
                .ok()
                .map(|c| c.fingerprint()),
        }
    }
}

pub async fn list_clients(registry_path: &Path) -> anyhow::Result<Vec<ClientSummary>> {
    let registry = open_registry(registry_path).await?;
    let clients = registry.list().await?;
    Ok(clients.iter().map(ClientSummary::from).collect())
}

pub fn print_clients(clients: &[ClientSummary], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(clients)?);
        return Ok(());
    }
    if clients.is_empty() {
        println!("no paired clients");
    }
    for client in clients {
        println!(
            "{}\t{}\t{}",
            client.client_id,
            client.paired_at,
            client.fingerprint.as_deref().unwrap_or("<invalid certificate>")
        );
    }
    Ok(())
}

/// Forget a paired client.
///
/// # Returns
/// `true` if the client was paired
pub async fn remove_client(registry_path: &Path, client_id: &str) -> anyhow::Result<bool> {
    let registry = open_registry(registry_path).await?;
    let removed = registry.remove(client_id).await?;
    if removed {
        info!(client_id = %client_id, "Removed paired client");
    } else {
        warn!(client_id = %client_id, "Client was not paired");
    }
    Ok(removed)
}

/// Inputs for a simulated pairing.
pub struct SimulateArgs<'a> {
    pub client_id: &'a str,
    pub client_cert: &'a Path,
    pub client_key: &'a Path,
    pub client_pin: Pin,
    pub host_pin: Pin,
}

/// Pair a client end to end against the configured host.
///
/// On success the client is written to the configured registry, exactly as
/// a real pairing would.
pub async fn simulate(config: &HostConfig, args: SimulateArgs<'_>) -> anyhow::Result<FlowOutcome> {
    let cert_pem = read_to_string(args.client_cert).await?;
    let key_pem = read_to_string(args.client_key).await?;

    let host = PairingHost::new(
        Arc::new(FileCertificateStore::new(&config.cert_path, &config.key_path)),
        Arc::new(open_registry(&config.registry_path).await?),
        &config.pairing,
    );
    let reaper = host.spawn_reaper();

    let mut client = PairingClient::new(&cert_pem, &key_pem, args.client_pin)
        .context("invalid client credentials")?;
    let outcome = run_pairing_flow(&host, &FixedPin(args.host_pin), args.client_id, &mut client)
        .await
        .context("pairing flow failed")?;

    if let Some(reaper) = reaper {
        reaper.abort();
    }

    let stats = host.stats().snapshot();
    info!(
        client_id = %args.client_id,
        requests = stats.received,
        rejected = stats.rejected,
        "Simulation finished"
    );
    Ok(outcome)
}

async fn open_registry(path: &Path) -> anyhow::Result<JsonFileRegistry> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    JsonFileRegistry::open(path)
        .await
        .with_context(|| format!("failed to open client registry {}", path.display()))
}

async fn read_to_string(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}
