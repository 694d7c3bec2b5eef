//! Pairing handshake configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default inactivity timeout for an in-flight pairing session.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 120;
/// Default period of the background reaper.
pub const DEFAULT_REAPER_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid pairing configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Seconds of inactivity after which a pairing session is discarded
    pub session_ttl_secs: u64,
    /// Seconds between sweeps of expired sessions; 0 disables the reaper
    pub reaper_interval_secs: u64,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            reaper_interval_secs: DEFAULT_REAPER_INTERVAL_SECS,
        }
    }
}

impl PairingConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// `None` when the reaper is disabled.
    pub fn reaper_interval(&self) -> Option<Duration> {
        (self.reaper_interval_secs > 0).then(|| Duration::from_secs(self.reaper_interval_secs))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_ttl_secs == 0 {
            return Err(ConfigError::Invalid("session_ttl_secs must be > 0".into()));
        }
        if self.reaper_interval_secs > self.session_ttl_secs {
            return Err(ConfigError::Invalid(
                "reaper_interval_secs must not exceed session_ttl_secs".into(),
            ));
        }
        Ok(())
    }
}
