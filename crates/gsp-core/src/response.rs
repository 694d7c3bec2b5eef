//! Structured `/pair` response document.
//!
//! Rendering (XML for GameStream clients, JSON for tooling) belongs to the
//! caller. Optional fields are omitted from the serialized form when absent.

use serde::Serialize;

/// HTTP-like status carried inside the document.
pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PairResponse {
    pub status_code: u16,
    /// `1` if the phase succeeded, `0` otherwise
    pub paired: u8,
    /// Hex of the host certificate PEM (phase 1)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plaincert: Option<String>,
    /// Hex of the encrypted challenge response (phase 2)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challengeresponse: Option<String>,
    /// Hex of `server_secret || signature` (phase 3)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairingsecret: Option<String>,
}

impl PairResponse {
    pub fn paired() -> Self {
        Self {
            status_code: STATUS_OK,
            paired: 1,
            plaincert: None,
            challengeresponse: None,
            pairingsecret: None,
        }
    }

    /// The only shape a rejection ever takes.
    pub fn rejected() -> Self {
        Self {
            paired: 0,
            ..Self::paired()
        }
    }

    pub fn bad_request() -> Self {
        Self {
            status_code: STATUS_BAD_REQUEST,
            ..Self::rejected()
        }
    }

    pub fn with_plaincert(mut self, hex: String) -> Self {
        self.plaincert = Some(hex);
        self
    }

    pub fn with_challenge_response(mut self, hex: String) -> Self {
        self.challengeresponse = Some(hex);
        self
    }

    pub fn with_pairing_secret(mut self, hex: String) -> Self {
        self.pairingsecret = Some(hex);
        self
    }

    pub fn is_paired(&self) -> bool {
        self.status_code == STATUS_OK && self.paired == 1
    }
}
