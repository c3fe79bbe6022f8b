// ── Scan strategies ──
//
// Each strategy is a plain async function over a shared `ScanContext`,
// entered through its own `BusyFlag`. A trigger that finds the flag held
// is dropped; the next tick retries.

pub mod brute_force;
pub mod neighbor;
pub mod recheck;
pub mod sweep;

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::PresenceConfig;
use crate::host::HostBridge;
use crate::model::{DeviceId, DeviceUpdate, MacAddress};
use crate::names::NameResolver;
use crate::net::LocalNetwork;
use crate::probe::Prober;
use crate::store::Registry;

pub use brute_force::BruteForceReport;
pub use neighbor::NeighborScanReport;
pub use recheck::RecheckReport;
pub use sweep::SweepReport;

// ── Busy flag ────────────────────────────────────────────────────────

/// `Idle -> Running -> Idle` guard for one strategy.
#[derive(Debug, Default)]
pub struct BusyFlag {
    running: AtomicBool,
}

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter `Running`, or `None` if a run is already in flight.
    pub fn try_acquire(&self) -> Option<BusyGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard { flag: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Returns the strategy to `Idle` on drop, including on panic.
#[derive(Debug)]
pub struct BusyGuard<'a> {
    flag: &'a BusyFlag,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.running.store(false, Ordering::Release);
    }
}

// ── Shared context ───────────────────────────────────────────────────

/// Everything a scan needs, shared by all strategies.
pub struct ScanContext {
    pub config: PresenceConfig,
    pub network: LocalNetwork,
    pub registry: Arc<Registry>,
    pub resolver: NameResolver,
    pub prober: Arc<dyn Prober>,
    pub host: Arc<HostBridge>,
}

/// A device observed by any strategy.
#[derive(Debug, Clone)]
pub(crate) struct Sighting<'a> {
    pub ip: Ipv4Addr,
    pub mac: &'a MacAddress,
    pub hostname: Option<&'a str>,
    /// Answered just now, as opposed to merely being cached.
    pub alive: bool,
    pub infrastructure: bool,
}

impl ScanContext {
    /// Resolve a name, merge into the registry, and register new devices
    /// with the host. Returns the identity and whether it was new.
    pub(crate) fn merge_sighting(&self, sighting: &Sighting<'_>, now: DateTime<Utc>) -> (DeviceId, bool) {
        let id = DeviceId::from_mac(sighting.mac);
        let name = self
            .resolver
            .candidate(sighting.ip, Some(sighting.mac), sighting.hostname);
        let infrastructure =
            sighting.infrastructure || self.resolver.neighbors().is_infrastructure(sighting.ip);
        let update = DeviceUpdate {
            mac: Some(sighting.mac.clone()),
            ip: Some(sighting.ip),
            name: Some(name),
            seen_at: sighting.alive.then_some(now),
            infrastructure,
        };

        let is_new = self.registry.upsert(&id, update, now);
        if is_new {
            debug!(id = %id, ip = %sighting.ip, mac = %sighting.mac, "new device");
        }
        if let Some(record) = self.registry.get(&id) {
            self.host.register(&record);
        }
        (id, is_new)
    }

    /// The grace window as a chrono duration.
    pub fn window(&self) -> chrono::Duration {
        self.config.time_window_chrono()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_held() {
        let flag = BusyFlag::new();
        let guard = flag.try_acquire();
        assert!(guard.is_some());
        assert!(flag.is_running());
        assert!(flag.try_acquire().is_none());

        drop(guard);
        assert!(!flag.is_running());
        assert!(flag.try_acquire().is_some());
    }

    #[test]
    fn panic_releases_the_flag() {
        let flag = BusyFlag::new();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = flag.try_acquire();
            panic!("scan blew up");
        }));
        assert!(outcome.is_err());
        assert!(!flag.is_running());
    }
}
