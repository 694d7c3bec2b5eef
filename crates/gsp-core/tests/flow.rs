//! End-to-end flows through `/pair` query dispatch with file-backed stores.

use std::collections::HashMap;
use std::sync::Arc;

use gsp_core::client::PairingClient;
use gsp_core::harness::{run_pairing_flow, FixedPin, FlowOutcome};
use gsp_core::{
    ClientRegistry, FileCertificateStore, JsonFileRegistry, PairResponse, PairingConfig,
    PairingError, PairingHost,
};
use gsp_crypto::pairing::Pin;

const HOST_CERT: &str = include_str!("../../../testdata/host_cert.pem");
const HOST_KEY: &str = include_str!("../../../testdata/host_key.pem");
const CLIENT_CERT: &str = include_str!("../../../testdata/client_cert.pem");
const CLIENT_KEY: &str = include_str!("../../../testdata/client_key.pem");

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("host_cert.pem"), HOST_CERT).unwrap();
        std::fs::write(dir.path().join("host_key.pem"), HOST_KEY).unwrap();
        Self { dir }
    }

    async fn host(&self) -> PairingHost<FileCertificateStore, JsonFileRegistry> {
        self.host_with_registry(self.dir.path().join("clients.json"))
            .await
    }

    async fn host_with_registry(
        &self,
        registry_path: std::path::PathBuf,
    ) -> PairingHost<FileCertificateStore, JsonFileRegistry> {
        let certs = FileCertificateStore::new(
            self.dir.path().join("host_cert.pem"),
            self.dir.path().join("host_key.pem"),
        );
        let registry = JsonFileRegistry::open(registry_path).await.unwrap();
        PairingHost::new(Arc::new(certs), Arc::new(registry), &PairingConfig::default())
    }
}

fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn prompt() -> FixedPin {
    FixedPin(Pin::parse("7777").unwrap())
}

/// Test: Pairing persists across a host restart
#[tokio::test]
async fn flow_pairing_survives_restart() {
    let fixture = Fixture::new();
    {
        let host = fixture.host().await;
        let mut client =
            PairingClient::new(CLIENT_CERT, CLIENT_KEY, Pin::parse("7777").unwrap()).unwrap();
        let outcome = run_pairing_flow(&host, &prompt(), "persisted", &mut client)
            .await
            .unwrap();
        assert!(outcome.is_paired());
    }

    let host = fixture.host().await;
    let resp = host
        .handle_query(
            &params(&[("uniqueid", "persisted"), ("phrase", "pairchallenge")]),
            &prompt(),
        )
        .await
        .unwrap();
    assert!(resp.is_paired());

    let clients = host.registry().list().await.unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].cert_pem, CLIENT_CERT);
}

/// Test: Wrong PIN through dispatch leaves the registry empty
#[tokio::test]
async fn flow_wrong_pin_not_persisted() {
    let fixture = Fixture::new();
    let host = fixture.host().await;
    let mut client =
        PairingClient::new(CLIENT_CERT, CLIENT_KEY, Pin::parse("1234").unwrap()).unwrap();

    let outcome = run_pairing_flow(&host, &prompt(), "c1", &mut client)
        .await
        .unwrap();
    assert!(matches!(outcome, FlowOutcome::HostNotTrusted(_)));
    assert!(host.registry().list().await.unwrap().is_empty());
}

/// Test: Malformed queries render as 400 without touching session state
#[tokio::test]
async fn flow_malformed_requests_are_bad_requests() {
    let fixture = Fixture::new();
    let host = fixture.host().await;
    let cert_hex = hex::encode(CLIENT_CERT);

    let cases = [
        params(&[("phrase", "getservercert")]),
        params(&[("uniqueid", "c1"), ("phrase", "bogus")]),
        params(&[("uniqueid", "c1"), ("clientchallenge", "not-hex")]),
        // Salt of the wrong length
        params(&[
            ("uniqueid", "c1"),
            ("phrase", "getservercert"),
            ("salt", "0011"),
            ("clientcert", cert_hex.as_str()),
        ]),
        // Client certificate that does not parse
        params(&[
            ("uniqueid", "c1"),
            ("phrase", "getservercert"),
            ("salt", "00112233445566778899aabbccddeeff"),
            ("clientcert", "deadbeef"),
        ]),
    ];

    for query in &cases {
        let resp = host.handle_query(query, &prompt()).await.unwrap();
        assert_eq!(resp, PairResponse::bad_request(), "query {query:?}");
    }
    assert!(host.sessions().is_empty());
    assert_eq!(host.stats().snapshot().bad_requests, cases.len() as u64);
}

/// Test: A broken certificate store is a host error, not a rejection
#[tokio::test]
async fn flow_missing_host_credentials_is_hard_error() {
    let dir = tempfile::tempdir().unwrap();
    let registry = JsonFileRegistry::open(dir.path().join("clients.json"))
        .await
        .unwrap();
    let host = PairingHost::new(
        Arc::new(FileCertificateStore::new(
            dir.path().join("missing_cert.pem"),
            dir.path().join("missing_key.pem"),
        )),
        Arc::new(registry),
        &PairingConfig::default(),
    );
    let client = PairingClient::new(CLIENT_CERT, CLIENT_KEY, Pin::parse("7777").unwrap()).unwrap();

    let err = host
        .handle_query(&client.get_server_cert_query("c1"), &prompt())
        .await
        .unwrap_err();
    assert!(matches!(err, PairingError::CertificateStore(_)));

    let stats = host.stats().snapshot();
    assert_eq!(stats.received, 1);
    assert_eq!(stats.failed, 1);
}

/// Test: A registry write failure in phase 4 is a hard error and leaves the
/// client untrusted
#[tokio::test]
async fn flow_registry_failure_does_not_pair() {
    let fixture = Fixture::new();
    let state = fixture.dir.path().join("state");
    std::fs::create_dir(&state).unwrap();
    let host = fixture.host_with_registry(state.join("clients.json")).await;
    let prompt = prompt();
    let mut client =
        PairingClient::new(CLIENT_CERT, CLIENT_KEY, Pin::parse("7777").unwrap()).unwrap();

    let resp = host
        .handle_query(&client.get_server_cert_query("c1"), &prompt)
        .await
        .unwrap();
    client.handle_server_cert(&resp).unwrap();
    let resp = host
        .handle_query(&client.client_challenge_query("c1").unwrap(), &prompt)
        .await
        .unwrap();
    let query = client.server_challenge_response_query("c1", &resp).unwrap();
    let resp = host.handle_query(&query, &prompt).await.unwrap();
    client.handle_pairing_secret(&resp).unwrap();

    std::fs::remove_dir_all(&state).unwrap();

    let err = host
        .handle_query(&client.client_pairing_secret_query("c1").unwrap(), &prompt)
        .await
        .unwrap_err();
    assert!(matches!(err, PairingError::Registry(_)));

    let resp = host
        .handle_query(&client.pair_challenge_query("c1"), &prompt)
        .await
        .unwrap();
    assert!(!resp.is_paired());
    assert!(!host.registry().is_paired("c1").await.unwrap());
    assert_eq!(host.stats().snapshot().failed, 1);
}

/// Test: Phase-1 response renders the host certificate as hex PEM
#[tokio::test]
async fn flow_response_document_shape() {
    let fixture = Fixture::new();
    let host = fixture.host().await;
    let client = PairingClient::new(CLIENT_CERT, CLIENT_KEY, Pin::parse("7777").unwrap()).unwrap();

    let resp = host
        .handle_query(&client.get_server_cert_query("c1"), &prompt())
        .await
        .unwrap();
    let json = serde_json::to_value(&resp).unwrap();

    assert_eq!(json["status_code"], 200);
    assert_eq!(json["paired"], 1);
    assert_eq!(json["plaincert"], hex::encode(HOST_CERT));
    assert!(json.get("challengeresponse").is_none());
}
