//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with help text.

use miette::Diagnostic;
use thiserror::Error;

use netpresence_config::ConfigError;
use netpresence_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const NETWORK: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Network ──────────────────────────────────────────────────────

    #[error("No usable IPv4 address on {interface}")]
    #[diagnostic(
        code(netpresence::no_address),
        help(
            "Check that the interface is up, or pick another one:\n\
             network_interface = \"wireless\"   # or set target_ip"
        )
    )]
    NoLocalAddress { interface: String },

    #[error("Could not enumerate network interfaces: {message}")]
    #[diagnostic(code(netpresence::interface))]
    Interface { message: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("Device '{identifier}' not found")]
    #[diagnostic(
        code(netpresence::not_found),
        help("Run: netpresence devices list")
    )]
    NotFound { identifier: String },

    // ── Registry ─────────────────────────────────────────────────────

    #[error("Registry error: {message}")]
    #[diagnostic(
        code(netpresence::registry),
        help("Check permissions on the data directory (data_dir in the config file).")
    )]
    Registry { message: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(
        code(netpresence::config),
        help("Inspect the file with: netpresence config show")
    )]
    Config(#[from] ConfigError),

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(netpresence::validation))]
    Validation { field: String, reason: String },

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(netpresence::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render YAML: {0}")]
    #[diagnostic(code(netpresence::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to render TOML: {0}")]
    #[diagnostic(code(netpresence::toml))]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoLocalAddress { .. } | Self::Interface { .. } => exit_code::NETWORK,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Config(_) => exit_code::CONFIG,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NoLocalAddress { interface } => CliError::NoLocalAddress { interface },

            CoreError::Interface(message) => CliError::Interface { message },

            CoreError::DeviceNotFound { identifier } => CliError::NotFound { identifier },

            CoreError::InvalidMac { input } => CliError::Validation {
                field: "mac".into(),
                reason: format!("not a MAC address: {input}"),
            },

            err @ (CoreError::RegistryRead { .. }
            | CoreError::RegistryWrite { .. }
            | CoreError::CorruptRegistry { .. }
            | CoreError::SchemaMismatch { .. }
            | CoreError::Serialization(_)) => CliError::Registry {
                message: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let missing: CliError = CoreError::DeviceNotFound {
            identifier: "presence-x".into(),
        }
        .into();
        assert_eq!(missing.exit_code(), exit_code::NOT_FOUND);

        let no_ip: CliError = CoreError::NoLocalAddress {
            interface: "eth0".into(),
        }
        .into();
        assert_eq!(no_ip.exit_code(), exit_code::NETWORK);

        let schema: CliError = CoreError::SchemaMismatch {
            found: 1,
            expected: 2,
        }
        .into();
        assert_eq!(schema.exit_code(), exit_code::GENERAL);

        let bad_mac: CliError = CoreError::InvalidMac {
            input: "kitchen".into(),
        }
        .into();
        assert!(matches!(bad_mac, CliError::Validation { ref field, .. } if field == "mac"));
        assert_eq!(bad_mac.exit_code(), exit_code::USAGE);
    }

    #[test]
    fn config_validation_is_a_config_error() {
        let err: CliError = ConfigError::Validation {
            field: "scan.shard_count".into(),
            reason: "must be greater than zero".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::CONFIG);
        assert_eq!(err.to_string(), "invalid scan.shard_count: must be greater than zero");
    }
}
