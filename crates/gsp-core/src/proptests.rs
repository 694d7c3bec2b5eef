use std::collections::HashMap;

use proptest::prelude::*;

use gsp_crypto::cert::Certificate;
use gsp_crypto::hash::sha256_concat;

use crate::dispatch::PairRequest;
use crate::errors::PhaseError;
use crate::phases::{client_pair, send_server_challenge};
use crate::test_support::FixedSecretSource;

const CLIENT_CERT: &str = include_str!("../../../testdata/client_cert.pem");

fn field_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("uniqueid".to_string()),
        Just("phrase".to_string()),
        Just("salt".to_string()),
        Just("clientcert".to_string()),
        Just("clientchallenge".to_string()),
        Just("serverchallengeresp".to_string()),
        Just("clientpairingsecret".to_string()),
        "[a-z]{1,12}",
    ]
}

proptest! {
    #[test]
    fn test_from_query_total(
        params in proptest::collection::hash_map(field_name(), "[0-9a-zA-Z]{0,40}", 0..6),
    ) {
        // Either a request or a format error, never a panic
        let _ = PairRequest::from_query(&params);
    }

    #[test]
    fn test_decoded_request_keeps_client_id(id in "[0-9A-F]{1,16}", secret in any::<Vec<u8>>()) {
        prop_assume!(!secret.is_empty());
        let params: HashMap<String, String> = [
            ("uniqueid".to_string(), id.clone()),
            ("clientpairingsecret".to_string(), hex::encode(&secret)),
        ]
        .into_iter()
        .collect();

        let req = PairRequest::from_query(&params).unwrap();
        prop_assert_eq!(req.client_id(), id.as_str());
        prop_assert_eq!(req, PairRequest::ClientPairingSecret { client_id: id, pairing_secret: secret });
    }

    #[test]
    fn test_unaligned_challenge_always_rejected(len in 0usize..100) {
        prop_assume!(len % 16 != 0 || len == 0);
        let result = send_server_challenge(&[9u8; 16], &vec![0u8; len], b"sig", &FixedSecretSource::zeros());
        prop_assert!(matches!(result, Err(PhaseError::Rejected(_))));
    }

    #[test]
    fn test_random_pairing_secret_never_pairs(secret in proptest::collection::vec(any::<u8>(), 0..300)) {
        let cert = Certificate::from_pem(CLIENT_CERT.as_bytes()).unwrap();
        let server_challenge = [1u8; 16];
        let client_hash = sha256_concat(&[&server_challenge, cert.signature(), &[2u8; 16]]);

        let result = client_pair(
            &server_challenge,
            &client_hash,
            &secret,
            cert.signature(),
            cert.public_key(),
        );
        prop_assert!(result.is_err());
    }
}
