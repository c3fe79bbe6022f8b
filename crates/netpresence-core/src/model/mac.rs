// ── Core identity types ──
//
// MacAddress and DeviceId form the foundation of the registry. A device is
// keyed by a content hash of its normalized MAC, never by IP, because DHCP
// leases move addresses between devices.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CoreError;

// ── MacAddress ──────────────────────────────────────────────────────

/// MAC address, normalized to uppercase colon-separated format (AA:BB:CC:DD:EE:FF).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress(String);

impl MacAddress {
    /// Parse a MAC address from any common format.
    ///
    /// Accepts colon, dash, or dot separated groups (including the
    /// single-digit octets BSD `arp` prints, e.g. `a:b:c:1:2:3`) and bare
    /// 12-digit hex.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let invalid = || CoreError::InvalidMac {
            input: raw.to_owned(),
        };
        let trimmed = raw.trim();

        let octets: Vec<u8> = if trimmed.contains([':', '-']) {
            let groups: Vec<&str> = trimmed.split([':', '-']).collect();
            if groups.len() != 6 {
                return Err(invalid());
            }
            groups
                .iter()
                .map(|g| parse_octet(g).ok_or_else(invalid))
                .collect::<Result<_, _>>()?
        } else {
            let hex: String = trimmed.chars().filter(|c| *c != '.').collect();
            if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            (0..6)
                .map(|i| {
                    hex.get(i * 2..i * 2 + 2)
                        .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                        .ok_or_else(invalid)
                })
                .collect::<Result<_, _>>()?
        };

        Ok(Self(
            octets
                .iter()
                .map(|o| format!("{o:02X}"))
                .collect::<Vec<_>>()
                .join(":"),
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The three-octet vendor prefix as six uppercase hex digits (`001A11`).
    pub fn oui(&self) -> String {
        self.0.chars().filter(|c| *c != ':').take(6).collect()
    }

    /// All-zero and broadcast addresses show up in half-resolved cache entries.
    pub fn is_placeholder(&self) -> bool {
        self.0 == "00:00:00:00:00:00" || self.0 == "FF:FF:FF:FF:FF:FF"
    }
}

fn parse_octet(group: &str) -> Option<u8> {
    if group.is_empty() || group.len() > 2 {
        return None;
    }
    u8::from_str_radix(group, 16).ok()
}

/// Normalize a raw MAC string, returning `None` when it is not a MAC at all.
pub fn normalize_mac(raw: &str) -> Option<String> {
    MacAddress::parse(raw).ok().map(|m| m.0)
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MacAddress {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MacAddress {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.0
    }
}

// ── DeviceId ────────────────────────────────────────────────────────

/// Namespace for MAC-derived identities. Changing it orphans every persisted record.
const DEVICE_NAMESPACE: Uuid = Uuid::from_u128(0x6e65_7470_7265_7365_6e63_6500_0000_0001);

/// Prefix the host platform uses to route things back to this adapter.
pub const DEVICE_ID_PREFIX: &str = "presence-";

/// Stable per-device key derived from the MAC address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn from_mac(mac: &MacAddress) -> Self {
        let hash = Uuid::new_v5(&DEVICE_NAMESPACE, mac.as_str().as_bytes());
        Self(format!("{DEVICE_ID_PREFIX}{}", hash.simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this identity belongs to this adapter's namespace.
    pub fn is_presence_id(raw: &str) -> bool {
        raw.starts_with(DEVICE_ID_PREFIX)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<&MacAddress> for DeviceId {
    fn from(mac: &MacAddress) -> Self {
        Self::from_mac(mac)
    }
}
