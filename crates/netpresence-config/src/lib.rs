//! Configuration for the netpresence engine and CLI.
//!
//! TOML settings file, `NETPRESENCE_*` environment overrides, data
//! directory resolution, and translation to `netpresence_core::PresenceConfig`.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use netpresence_core::{InterfacePreference, PresenceConfig, ScanTuning, SystemProberOptions};

/// File name of the persisted registry inside the data directory.
pub const REGISTRY_FILE: &str = "registry.json";

/// File name of the OUI vendor table inside the data directory.
pub const OUI_FILE: &str = "oui.txt";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Raise the log level to debug.
    pub debug: bool,

    /// Grace window in minutes, clamped to 1..=10800.
    pub time_window_minutes: i64,

    /// Scan around this address instead of the host's own. Empty means none.
    pub target_ip: String,

    /// `wired` or `wireless`.
    pub network_interface: InterfacePreference,

    pub use_brute_force: bool,

    /// IP or MAC addresses that must never be arpinged.
    pub excluded_from_arping: Vec<String>,

    /// Register gateway/controller infrastructure with the host as well.
    pub show_infrastructure: bool,

    /// mDNS instance-name prefixes that mark infrastructure devices.
    pub infrastructure_markers: Vec<String>,

    /// Run arping through `sudo -n`.
    pub use_sudo_for_arping: bool,

    /// Where the registry lives. Defaults to the platform data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// OUI vendor table. Defaults to `oui.txt` in the data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oui_file: Option<PathBuf>,

    pub scan: ScanSettings,
}

impl Default for Settings {
    fn default() -> Self {
        let defaults = PresenceConfig::default();
        Self {
            debug: defaults.debug,
            time_window_minutes: i64::try_from(defaults.time_window.as_secs() / 60).unwrap_or(10),
            target_ip: String::new(),
            network_interface: defaults.preferred_interface,
            use_brute_force: defaults.use_brute_force,
            excluded_from_arping: defaults.excluded_from_arping,
            show_infrastructure: defaults.show_infrastructure,
            infrastructure_markers: defaults.infrastructure_markers,
            use_sudo_for_arping: false,
            data_dir: None,
            oui_file: None,
            scan: ScanSettings::default(),
        }
    }
}

/// `[scan]` table: cadence and intensity tunables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanSettings {
    pub tick_secs: u64,
    pub brute_force_interval_secs: u64,
    pub neighbor_scan_interval_secs: u64,
    pub name_sweep_interval_secs: u64,
    pub shard_count: usize,
    /// Every n-th brute-force cycle is a deep pass; 0 disables deep passes.
    pub deep_pass_every: u32,
    pub base_attempts: u32,
    pub interested_attempts: u32,
    pub deep_attempts: u32,
    pub probe_spacing_ms: u64,
    pub probe_timeout_ms: u64,
    pub candidate_retention_hours: u64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self::from(&ScanTuning::default())
    }
}

impl From<&ScanTuning> for ScanSettings {
    fn from(t: &ScanTuning) -> Self {
        Self {
            tick_secs: t.tick_interval.as_secs(),
            brute_force_interval_secs: t.brute_force_interval.as_secs(),
            neighbor_scan_interval_secs: t.neighbor_scan_interval.as_secs(),
            name_sweep_interval_secs: t.name_sweep_interval.as_secs(),
            shard_count: t.shard_count,
            deep_pass_every: t.deep_pass_every,
            base_attempts: t.base_attempts,
            interested_attempts: t.interested_attempts,
            deep_attempts: t.deep_attempts,
            probe_spacing_ms: millis(t.probe_spacing),
            probe_timeout_ms: millis(t.probe_timeout),
            candidate_retention_hours: t.candidate_retention.as_secs() / 3600,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn positive<T: Copy + Default + PartialEq>(field: &str, value: T) -> Result<T, ConfigError> {
    if value == T::default() {
        return Err(ConfigError::Validation {
            field: format!("scan.{field}"),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(value)
}

impl ScanSettings {
    /// Translate to engine tunables. Intervals, shards, attempts and the
    /// probe timeout must be non-zero.
    pub fn to_tuning(&self) -> Result<ScanTuning, ConfigError> {
        let secs = |field, value| positive(field, value).map(Duration::from_secs);
        Ok(ScanTuning {
            tick_interval: secs("tick_secs", self.tick_secs)?,
            brute_force_interval: secs("brute_force_interval_secs", self.brute_force_interval_secs)?,
            neighbor_scan_interval: secs(
                "neighbor_scan_interval_secs",
                self.neighbor_scan_interval_secs,
            )?,
            name_sweep_interval: secs("name_sweep_interval_secs", self.name_sweep_interval_secs)?,
            shard_count: positive("shard_count", self.shard_count)?,
            deep_pass_every: self.deep_pass_every,
            base_attempts: positive("base_attempts", self.base_attempts)?,
            interested_attempts: positive("interested_attempts", self.interested_attempts)?,
            deep_attempts: positive("deep_attempts", self.deep_attempts)?,
            probe_spacing: Duration::from_millis(self.probe_spacing_ms),
            probe_timeout: Duration::from_millis(positive("probe_timeout_ms", self.probe_timeout_ms)?),
            candidate_retention: Duration::from_secs(
                self.candidate_retention_hours.saturating_mul(3600),
            ),
        })
    }
}

// ── Translation ─────────────────────────────────────────────────────

impl Settings {
    /// Build the engine configuration. An unparseable `target_ip` is
    /// ignored with a warning; zero scan tunables are rejected.
    pub fn to_presence_config(&self) -> Result<PresenceConfig, ConfigError> {
        Ok(PresenceConfig {
            debug: self.debug,
            time_window: PresenceConfig::time_window_from_minutes(self.time_window_minutes),
            target_ip_override: parse_target_ip(&self.target_ip),
            preferred_interface: self.network_interface,
            use_brute_force: self.use_brute_force,
            excluded_from_arping: self
                .excluded_from_arping
                .iter()
                .map(|entry| entry.trim().to_owned())
                .filter(|entry| !entry.is_empty())
                .collect(),
            show_infrastructure: self.show_infrastructure,
            infrastructure_markers: self.infrastructure_markers.clone(),
            scan: self.scan.to_tuning()?,
        })
    }

    /// Options for the command-backed prober on `interface`.
    pub fn prober_options(&self, interface: &str) -> SystemProberOptions {
        SystemProberOptions {
            interface: interface.to_owned(),
            use_sudo_for_arping: self.use_sudo_for_arping,
            probe_timeout: Duration::from_millis(self.scan.probe_timeout_ms.max(1)),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir().join(REGISTRY_FILE)
    }

    pub fn oui_path(&self) -> PathBuf {
        self.oui_file
            .clone()
            .unwrap_or_else(|| self.data_dir().join(OUI_FILE))
    }
}

fn parse_target_ip(raw: &str) -> Option<Ipv4Addr> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(ip) => Some(ip),
        Err(_) => {
            warn!(target_ip = raw, "ignoring invalid target_ip");
            None
        }
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "netpresence", "netpresence")
}

fn home_fallback(parts: &[&str]) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.extend(parts);
    p
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(&[".config", "netpresence", "config.toml"]),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Platform data directory for the registry and OUI table.
pub fn default_data_dir() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(&[".local", "share", "netpresence"]),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

// ── Loading ─────────────────────────────────────────────────────────

/// Defaults, then the TOML file at `path`, then `NETPRESENCE_*` env vars.
/// Nested keys use a double underscore: `NETPRESENCE_SCAN__SHARD_COUNT`.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Settings::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("NETPRESENCE_").split("__"))
}

/// Load settings from `path` (or the canonical path) plus environment.
/// Zero scan tunables fail with [`ConfigError::Validation`].
pub fn load_config(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    let settings: Settings = figment(&path).extract()?;
    settings.scan.to_tuning()?;
    Ok(settings)
}

// ── Saving ──────────────────────────────────────────────────────────

/// Serialize settings to TOML and write them to `path`.
pub fn save_config(settings: &Settings, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(settings)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Write a default config file unless one already exists. Returns whether
/// a file was written.
pub fn init_config(path: &Path) -> Result<bool, ConfigError> {
    if path.exists() {
        return Ok(false);
    }
    save_config(&Settings::default(), path)?;
    Ok(true)
}
