//! Randomness for handshake secrets.
//!
//! Secrets come from a [`SecretSource`] so the handshake can be driven with
//! known values under test. The only source shipped by this crate is
//! [`OsSecretSource`].

#[derive(Debug, thiserror::Error)]
#[error("secure random source failed: {0}")]
pub struct RngError(String);

impl RngError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Supplier of cryptographically secure random bytes.
pub trait SecretSource: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> Result<(), RngError>;

    fn secret16(&self) -> Result<[u8; 16], RngError> {
        let mut b = [0u8; 16];
        self.fill(&mut b)?;
        Ok(b)
    }
}

/// Operating-system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSecretSource;

impl SecretSource for OsSecretSource {
    fn fill(&self, buf: &mut [u8]) -> Result<(), RngError> {
        getrandom::getrandom(buf).map_err(|e| RngError(e.to_string()))
    }
}
