//! PIN handling and pairing-key derivation.

use std::fmt;
use std::str::FromStr;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::hash::sha256_concat;

pub const SALT_LEN: usize = 16;
pub const PIN_LEN: usize = 4;

/// Derive the shared AES key both ends compute independently.
///
/// key = SHA256(salt || pin)[0..16]
///
/// Must stay bit-for-bit compatible with deployed clients. A mismatch is only
/// ever observed indirectly, as a failed decryption or hash check later on.
pub fn derive_pairing_key(salt: &[u8; SALT_LEN], pin: &str) -> [u8; 16] {
    let digest = sha256_concat(&[salt, pin.as_bytes()]);
    let mut key = [0u8; 16];
    key.copy_from_slice(&digest[..16]);
    key
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PinError {
    #[error("PIN must be exactly {PIN_LEN} characters, got {0}")]
    Length(usize),
    #[error("PIN must contain only ASCII digits")]
    NotNumeric,
}

/// A PIN as entered by the user on the host.
///
/// Clients only ever display four decimal digits, so anything else would
/// derive a key no client can match.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Pin(String);

impl Pin {
    pub fn parse(s: &str) -> Result<Self, PinError> {
        let s = s.trim();
        if s.len() != PIN_LEN {
            return Err(PinError::Length(s.len()));
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PinError::NotNumeric);
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the pairing key for this PIN and the client's salt.
    pub fn derive_key(&self, salt: &[u8; SALT_LEN]) -> [u8; 16] {
        derive_pairing_key(salt, &self.0)
    }
}

impl FromStr for Pin {
    type Err = PinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pin(****)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256;

    #[test]
    fn test_key_is_prefix_of_salted_hash() {
        let salt = [0xABu8; 16];
        let key = derive_pairing_key(&salt, "1234");

        let mut joined = salt.to_vec();
        joined.extend_from_slice(b"1234");
        assert_eq!(key, sha256(&joined)[..16]);
    }

    #[test]
    fn test_pin_parse() {
        assert!(Pin::parse("0042").is_ok());
        assert_eq!(Pin::parse(" 9876\n").unwrap().as_str(), "9876");
        assert_eq!(Pin::parse("123"), Err(PinError::Length(3)));
        assert_eq!(Pin::parse("12a4"), Err(PinError::NotNumeric));
    }

    #[test]
    fn test_pin_debug_is_redacted() {
        let pin: Pin = "1234".parse().unwrap();
        assert!(!format!("{:?}", pin).contains("1234"));
    }

    #[test]
    fn test_pin_derive_key_matches_free_function() {
        let salt = [3u8; 16];
        let pin = Pin::parse("5555").unwrap();
        assert_eq!(pin.derive_key(&salt), derive_pairing_key(&salt, "5555"));
    }
}
