use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use gsp_core::PairingConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),
    #[error("config parse error: {0}")]
    ParseError(String),
    #[error("config validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    // Host credentials
    pub cert_path: PathBuf,
    pub key_path: PathBuf,

    // Paired clients
    pub registry_path: PathBuf,

    // Logging
    pub log_level: String,

    pub pairing: PairingConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            cert_path: PathBuf::from("gsp/host_cert.pem"),
            key_path: PathBuf::from("gsp/host_key.pem"),
            registry_path: PathBuf::from("gsp/clients.json"),
            log_level: "info".to_string(),
            pairing: PairingConfig::default(),
        }
    }
}

impl HostConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileNotFound(format!("{}: {}", path.display(), e)))?;

        let config: HostConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn load_from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build from `GSP_*` variables looked up through `var`, defaults elsewhere.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = var("GSP_CERT_PATH") {
            config.cert_path = path.into();
        }
        if let Some(path) = var("GSP_KEY_PATH") {
            config.key_path = path.into();
        }
        if let Some(path) = var("GSP_REGISTRY_PATH") {
            config.registry_path = path.into();
        }
        if let Some(secs) = var("GSP_SESSION_TTL_SECS") {
            config.pairing.session_ttl_secs = parse_secs("GSP_SESSION_TTL_SECS", &secs)?;
        }
        if let Some(secs) = var("GSP_REAPER_INTERVAL_SECS") {
            config.pairing.reaper_interval_secs = parse_secs("GSP_REAPER_INTERVAL_SECS", &secs)?;
        }
        if let Some(level) = var("RUST_LOG") {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, path) in [
            ("cert_path", &self.cert_path),
            ("key_path", &self.key_path),
            ("registry_path", &self.registry_path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::ValidationError(format!("{name} must not be empty")));
            }
        }
        self.pairing
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn parse_secs(name: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ParseError(format!("{name}: expected seconds, got {value:?}")))
}
