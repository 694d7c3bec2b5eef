//! GSP Core - the host side of the GameStream pairing handshake.
//!
//! This crate implements:
//! - The four pairing phases as pure functions
//! - Per-client session state with expiry
//! - The session-managed handshake and its `/pair` request dispatch
//! - Certificate store and client registry abstractions
//! - A reference client and test harness

#![forbid(unsafe_code)]

// Handshake
pub mod phases;
pub mod pairing;
pub mod session;
pub mod dispatch;
pub mod response;

// Collaborators
pub mod credentials;
pub mod registry;

// Supporting modules
pub mod config;
pub mod errors;
pub mod client;
pub mod harness;

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod proptests;

pub use config::PairingConfig;
pub use credentials::{CertificateStore, FileCertificateStore, HostCredentials, StaticCertificateStore};
pub use dispatch::{PairRequest, PinPrompt};
pub use errors::{PairingError, Rejected};
pub use pairing::PairingHost;
pub use registry::{ClientRegistry, InMemoryRegistry, JsonFileRegistry, PairedClient};
pub use response::PairResponse;
pub use session::SessionState;
