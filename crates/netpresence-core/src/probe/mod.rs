// ── Probe primitives ──
//
// Thin, bounded wrappers around ICMP echo and ARP tooling. A probe that
// gets no answer is the common case (most addresses are unused), so every
// operation reports failure as `false` / `None` / empty rather than an
// error.

pub mod parse;
mod system;

use std::net::Ipv4Addr;

use async_trait::async_trait;
use serde::Serialize;
use strum::{Display, EnumString};

use crate::model::MacAddress;

pub use system::{ProbeTool, SystemProber, SystemProberOptions, tool_failure};

/// One resolved ARP cache line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArpEntry {
    pub ip: Ipv4Addr,
    pub mac: MacAddress,
    /// Reverse-resolved name the tool printed, if any (`?` is dropped).
    pub hostname: Option<String>,
}

/// Kernel neighbor-table state (`ip neighbor`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize)]
#[strum(serialize_all = "UPPERCASE")]
pub enum NeighborState {
    Reachable,
    Stale,
    Delay,
    Probe,
    Permanent,
    Noarp,
    Incomplete,
    Failed,
}

impl NeighborState {
    /// States in which the neighbor answered recently enough to count.
    pub fn is_usable(self) -> bool {
        matches!(
            self,
            Self::Reachable | Self::Stale | Self::Delay | Self::Permanent
        )
    }
}

/// One `ip neighbor` line with a link-layer address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NeighborEntry {
    pub ip: Ipv4Addr,
    pub mac: MacAddress,
    pub state: NeighborState,
}

/// Issues real network probes. Implementations must bound every call by a
/// timeout and must not panic on tool failure.
#[async_trait]
pub trait Prober: Send + Sync {
    /// ICMP echo; `true` if any of `attempts` replies arrived.
    async fn ping(&self, ip: Ipv4Addr, attempts: u32) -> bool;

    /// ARP request; `true` if the address answered.
    async fn arp_request(&self, ip: Ipv4Addr, attempts: u32) -> bool;

    /// ARP cache entry for one address.
    async fn arp_cache_entry(&self, ip: Ipv4Addr) -> Option<ArpEntry>;

    /// Every resolved entry in the ARP cache.
    async fn dump_arp_cache(&self) -> Vec<ArpEntry>;

    /// The kernel neighbor table, all states.
    async fn neighbor_table(&self) -> Vec<NeighborEntry>;
}
