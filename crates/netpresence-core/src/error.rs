// ── Core error types ──
//
// Probe failures are never errors: a silent address is the normal case
// and surfaces as `false` / `None` from the prober. What remains here are
// the operator-visible failures: persistence, local network resolution,
// and bad identifiers.

use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Persistence errors ───────────────────────────────────────────
    #[error("Failed to read registry from {path}: {source}")]
    RegistryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write registry to {path}: {source}")]
    RegistryWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Registry file {path} is corrupt: {reason}")]
    CorruptRegistry { path: PathBuf, reason: String },

    #[error("Registry schema version {found} is not supported (expected {expected})")]
    SchemaMismatch { found: u32, expected: u32 },

    #[error("Failed to serialize registry: {0}")]
    Serialization(#[from] serde_json::Error),

    // ── Network environment errors ───────────────────────────────────
    #[error("No usable IPv4 address found on {interface}")]
    NoLocalAddress { interface: String },

    #[error("Network interface error: {0}")]
    Interface(String),

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    #[error("Invalid MAC address: {input}")]
    InvalidMac { input: String },
}

impl From<network_interface::Error> for CoreError {
    fn from(err: network_interface::Error) -> Self {
        Self::Interface(err.to_string())
    }
}
