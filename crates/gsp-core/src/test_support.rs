//! Deterministic collaborators for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use gsp_crypto::random::{RngError, SecretSource};

/// Hands out a fixed sequence of 16-byte values, cycling when exhausted.
pub(crate) struct FixedSecretSource {
    values: Vec<[u8; 16]>,
    next: AtomicUsize,
}

impl FixedSecretSource {
    pub(crate) fn new(values: impl Into<Vec<[u8; 16]>>) -> Self {
        Self {
            values: values.into(),
            next: AtomicUsize::new(0),
        }
    }

    pub(crate) fn zeros() -> Self {
        Self::new([[0u8; 16]])
    }
}

impl SecretSource for FixedSecretSource {
    fn fill(&self, buf: &mut [u8]) -> Result<(), RngError> {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.values.len();
        for (dst, src) in buf.iter_mut().zip(self.values[i].iter().cycle()) {
            *dst = *src;
        }
        Ok(())
    }
}

/// A random source that is always unavailable.
pub(crate) struct FailingSecretSource;

impl SecretSource for FailingSecretSource {
    fn fill(&self, _buf: &mut [u8]) -> Result<(), RngError> {
        Err(RngError::new("entropy source unavailable"))
    }
}
