// ── Runtime engine configuration ──
//
// These types describe *how* the engine scans and reports. They never
// touch disk: the config crate (or a test) builds a `PresenceConfig` and
// hands it in.

use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::model::MacAddress;

/// Bounds for the "recently spotted" grace window, in minutes.
pub const MIN_TIME_WINDOW_MINUTES: i64 = 1;
pub const MAX_TIME_WINDOW_MINUTES: i64 = 10_800;

/// Which link to scan from when both are up.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum InterfacePreference {
    #[default]
    Wired,
    Wireless,
}

impl InterfacePreference {
    /// Conventional interface name for this link type.
    pub fn default_interface(self) -> &'static str {
        match self {
            Self::Wired => "eth0",
            Self::Wireless => "wlan0",
        }
    }
}

/// Scan cadence and intensity tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTuning {
    /// Clock period; one targeted re-check pass per tick.
    pub tick_interval: Duration,
    /// Minimum time between brute-force subnet scans.
    pub brute_force_interval: Duration,
    /// Minimum time between passive neighbor-cache scans.
    pub neighbor_scan_interval: Duration,
    /// How often mDNS/NetBIOS name sources are swept.
    pub name_sweep_interval: Duration,
    /// Number of parallel shards in a brute-force scan.
    pub shard_count: usize,
    /// Every n-th brute-force cycle probes every address at `deep_attempts`.
    pub deep_pass_every: u32,
    pub base_attempts: u32,
    pub interested_attempts: u32,
    pub deep_attempts: u32,
    /// Pause between addresses within one shard.
    pub probe_spacing: Duration,
    /// Per-attempt probe timeout.
    pub probe_timeout: Duration,
    /// Un-adopted records unseen this long are pruned.
    pub candidate_retention: Duration,
}

impl Default for ScanTuning {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            brute_force_interval: Duration::from_secs(30 * 60),
            neighbor_scan_interval: Duration::from_secs(5 * 60),
            name_sweep_interval: Duration::from_secs(60 * 60),
            shard_count: 3,
            deep_pass_every: 6,
            base_attempts: 1,
            interested_attempts: 2,
            deep_attempts: 3,
            probe_spacing: Duration::from_millis(500),
            probe_timeout: Duration::from_secs(1),
            candidate_retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Static configuration for one engine instance.
///
/// Built by the config crate or tests, passed to `Engine` -- core never
/// reads config files.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct PresenceConfig {
    pub debug: bool,
    /// Grace window before a device is reported as not recently spotted.
    pub time_window: Duration,
    /// Scan around this address instead of the host's own.
    pub target_ip_override: Option<Ipv4Addr>,
    pub preferred_interface: InterfacePreference,
    pub use_brute_force: bool,
    /// IP addresses or MAC addresses that must never be arpinged.
    pub excluded_from_arping: Vec<String>,
    /// Register gateway/controller infrastructure with the host as well.
    pub show_infrastructure: bool,
    /// Service-instance prefixes that identify infrastructure devices.
    pub infrastructure_markers: Vec<String>,
    pub scan: ScanTuning,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            debug: false,
            time_window: Duration::from_secs(10 * 60),
            target_ip_override: None,
            preferred_interface: InterfacePreference::default(),
            use_brute_force: true,
            excluded_from_arping: Vec::new(),
            show_infrastructure: false,
            infrastructure_markers: vec!["CandleMQTT-".into()],
            scan: ScanTuning::default(),
        }
    }
}

impl PresenceConfig {
    /// Grace window from a user-supplied minute count, clamped to the
    /// supported range.
    pub fn time_window_from_minutes(minutes: i64) -> Duration {
        let clamped = minutes.clamp(MIN_TIME_WINDOW_MINUTES, MAX_TIME_WINDOW_MINUTES);
        Duration::from_secs(clamped.unsigned_abs() * 60)
    }

    /// The grace window as a chrono duration, for timestamp arithmetic.
    pub fn time_window_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.time_window).unwrap_or(chrono::Duration::MAX)
    }

    /// Whether arping is disabled for this address (matched by IP or MAC).
    pub fn is_arping_excluded(&self, ip: Ipv4Addr, mac: Option<&MacAddress>) -> bool {
        let ip = ip.to_string();
        self.excluded_from_arping.iter().any(|entry| {
            let entry = entry.trim();
            entry == ip
                || mac.is_some_and(|m| {
                    MacAddress::parse(entry).is_ok_and(|excluded| excluded == *m)
                })
        })
    }
}
