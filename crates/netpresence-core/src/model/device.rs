// ── Device domain types ──

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use strum::Display;

use super::mac::{DeviceId, MacAddress};

/// Where a display name came from. Ordered by trust: a later variant
/// always wins over an earlier one, never the other way round.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NameSource {
    /// The IP literal, used when nothing better is known.
    #[default]
    Address,
    /// Short brand token from the OUI table.
    Vendor,
    /// Hostname from the ARP cache, mDNS, or NetBIOS.
    Neighbor,
    /// Title the user gave the thing on the host.
    User,
}

/// A name proposal, already prefixed but not yet deduplicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameCandidate {
    pub name: String,
    pub source: NameSource,
}

/// The canonical presence record for one physical device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: DeviceId,
    /// `None` only for records seeded from the host before any scan saw them.
    pub mac: Option<MacAddress>,
    pub ip: Option<Ipv4Addr>,
    pub display_name: String,
    #[serde(default)]
    pub name_source: NameSource,
    pub first_seen: DateTime<Utc>,
    /// Never trusted across restarts; cleared on load.
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub adopted: bool,
    #[serde(default = "default_true")]
    pub data_collection_enabled: bool,
    #[serde(default)]
    pub mute_until: Option<DateTime<Utc>>,
    /// Start of the current run of failed probes.
    #[serde(default)]
    pub not_seen_since: Option<DateTime<Utc>>,
    /// Gateway/controller infrastructure, hidden from the host by default.
    #[serde(default)]
    pub infrastructure: bool,
}

fn default_true() -> bool {
    true
}

impl DeviceRecord {
    pub fn new(id: DeviceId, display_name: String, name_source: NameSource, now: DateTime<Utc>) -> Self {
        Self {
            id,
            mac: None,
            ip: None,
            display_name,
            name_source,
            first_seen: now,
            last_seen: None,
            adopted: false,
            data_collection_enabled: true,
            mute_until: None,
            not_seen_since: None,
            infrastructure: false,
        }
    }

    pub fn is_muted(&self, now: DateTime<Utc>) -> bool {
        self.mute_until.is_some_and(|until| now < until)
    }

    /// Most recent moment the device was known to exist.
    pub fn last_sighting(&self) -> DateTime<Utc> {
        self.last_seen.unwrap_or(self.first_seen)
    }

    /// Whole minutes since the last successful probe; `None` when never seen
    /// this run or while muted.
    pub fn minutes_ago(&self, now: DateTime<Utc>) -> Option<i64> {
        if self.is_muted(now) {
            return None;
        }
        self.last_seen.map(|seen| (now - seen).num_minutes().max(0))
    }

    /// The `recently_spotted` value reported to the host.
    ///
    /// Only a sighting can make a device present. Once seen, a failure run
    /// keeps it spotted until it has been unreachable for longer than
    /// `window`; otherwise the last sighting decides. A device never seen
    /// this run is unknown until its failure run outlasts the window. Muted
    /// devices are unknown.
    pub fn recently_spotted(&self, now: DateTime<Utc>, window: Duration) -> Option<bool> {
        if self.is_muted(now) {
            return None;
        }
        let within = |t: DateTime<Utc>| now - t <= window;
        match (self.last_seen, self.not_seen_since) {
            (None, Some(since)) if !within(since) => Some(false),
            (None, _) => None,
            (Some(_), Some(since)) => Some(within(since)),
            (Some(seen), None) => Some(within(seen)),
        }
    }
}

/// Deadline for a mute of `duration` starting at `now`. A zero duration
/// lifts the mute; an unrepresentable one mutes indefinitely.
pub fn mute_deadline(now: DateTime<Utc>, duration: std::time::Duration) -> Option<DateTime<Utc>> {
    if duration.is_zero() {
        return None;
    }
    Duration::from_std(duration)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .or(Some(DateTime::<Utc>::MAX_UTC))
}

/// Partial update merged into the registry by `Registry::upsert`.
#[derive(Debug, Clone, Default)]
pub struct DeviceUpdate {
    pub mac: Option<MacAddress>,
    pub ip: Option<Ipv4Addr>,
    pub name: Option<NameCandidate>,
    /// Moment the device answered; `None` for passive observations that
    /// prove nothing about current liveness.
    pub seen_at: Option<DateTime<Utc>>,
    pub infrastructure: bool,
}

impl DeviceUpdate {
    /// Update for a device that just answered a probe.
    pub fn sighting(mac: MacAddress, ip: Ipv4Addr, name: NameCandidate, now: DateTime<Utc>) -> Self {
        Self {
            mac: Some(mac),
            ip: Some(ip),
            name: Some(name),
            seen_at: Some(now),
            infrastructure: false,
        }
    }
}
