// ── Name resolution ──
//
// Turns an (ip, mac, hostname hint) triple into a display name. The chain
// is: hostname hint, swept neighbor names, OUI vendor brand, IP literal.
// Deduplication against the registry happens inside the registry lock.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use ipnetwork::Ipv4Network;
use tracing::debug;

use crate::model::{DeviceId, MacAddress, NameCandidate, NameSource};
use crate::probe::parse::{
    DiscoveredName, is_usable_name, parse_avahi_output, parse_nbtscan_output,
};
use crate::probe::{ProbeTool, SystemProber};
use crate::store::Registry;
use crate::vendor::{VendorLookup, short_brand};

/// Label every generated name starts with, so things from this adapter
/// group together on the host.
pub const NAME_PREFIX: &str = "Presence - ";

/// Collision suffixes tried before a duplicate name is accepted.
pub const MAX_NAME_ATTEMPTS: u32 = 20;

/// Smallest unused variant of `base`: `base`, then `base 2`, `base 3`, ...
///
/// After [`MAX_NAME_ATTEMPTS`] the last candidate is returned even if it
/// is still taken.
pub fn deduplicate(base: &str, is_taken: impl Fn(&str) -> bool) -> String {
    if !is_taken(base) {
        return base.to_owned();
    }
    let mut candidate = base.to_owned();
    for k in 2..=MAX_NAME_ATTEMPTS {
        candidate = format!("{base} {k}");
        if !is_taken(&candidate) {
            return candidate;
        }
    }
    debug!(base, "name attempts exhausted, accepting duplicate");
    candidate
}

// ── Neighbor names ───────────────────────────────────────────────────

/// A source of `ip -> name` mappings swept in the background.
#[async_trait]
pub trait NameDiscovery: Send + Sync {
    fn label(&self) -> &'static str;

    /// One full sweep. Failures yield an empty list.
    async fn discover(&self) -> Vec<DiscoveredName>;
}

/// Most recent sweep result, shared by every scan.
#[derive(Debug, Default)]
pub struct NeighborNames {
    by_ip: DashMap<Ipv4Addr, DiscoveredName>,
}

impl NeighborNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a fresh sweep. Earlier entries win over later ones for the
    /// same address, so source order is priority order.
    pub fn replace_all(&self, found: impl IntoIterator<Item = DiscoveredName>) {
        self.by_ip.clear();
        for entry in found {
            self.by_ip.entry(entry.ip).or_insert(entry);
        }
    }

    pub fn lookup(&self, ip: Ipv4Addr) -> Option<String> {
        self.by_ip.get(&ip).map(|e| e.name.clone())
    }

    pub fn is_infrastructure(&self, ip: Ipv4Addr) -> bool {
        self.by_ip.get(&ip).is_some_and(|e| e.infrastructure)
    }

    pub fn len(&self) -> usize {
        self.by_ip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ip.is_empty()
    }
}

/// mDNS names from `avahi-browse`.
pub struct AvahiBrowse {
    runner: Arc<SystemProber>,
    markers: Vec<String>,
    budget: Duration,
}

impl AvahiBrowse {
    pub fn new(runner: Arc<SystemProber>, markers: Vec<String>) -> Self {
        Self {
            runner,
            markers,
            budget: Duration::from_secs(30),
        }
    }
}

#[async_trait]
impl NameDiscovery for AvahiBrowse {
    fn label(&self) -> &'static str {
        "avahi"
    }

    async fn discover(&self) -> Vec<DiscoveredName> {
        self.runner
            .run(ProbeTool::AvahiBrowse, &["-p", "-a", "-r", "-t"], self.budget)
            .await
            .map(|out| parse_avahi_output(&String::from_utf8_lossy(&out.stdout), &self.markers))
            .unwrap_or_default()
    }
}

/// NetBIOS names from `nbtscan` over the scanned subnet.
pub struct NbtScan {
    runner: Arc<SystemProber>,
    subnet: Ipv4Network,
    budget: Duration,
}

impl NbtScan {
    pub fn new(runner: Arc<SystemProber>, subnet: Ipv4Network) -> Self {
        Self {
            runner,
            subnet,
            budget: Duration::from_secs(60),
        }
    }
}

#[async_trait]
impl NameDiscovery for NbtScan {
    fn label(&self) -> &'static str {
        "nbtscan"
    }

    async fn discover(&self) -> Vec<DiscoveredName> {
        let range = self.subnet.to_string();
        self.runner
            .run(ProbeTool::Nbtscan, &["-q", "-e", range.as_str()], self.budget)
            .await
            .map(|out| parse_nbtscan_output(&String::from_utf8_lossy(&out.stdout)))
            .unwrap_or_default()
    }
}

// ── Resolver ─────────────────────────────────────────────────────────

/// The fixed priority chain from hints to a prefixed name candidate.
#[derive(Clone)]
pub struct NameResolver {
    neighbors: Arc<NeighborNames>,
    vendors: Arc<dyn VendorLookup>,
}

impl NameResolver {
    pub fn new(neighbors: Arc<NeighborNames>, vendors: Arc<dyn VendorLookup>) -> Self {
        Self { neighbors, vendors }
    }

    pub fn neighbors(&self) -> &NeighborNames {
        &self.neighbors
    }

    /// Best available name, already prefixed, not yet deduplicated.
    pub fn candidate(&self, ip: Ipv4Addr, mac: Option<&MacAddress>, seed: Option<&str>) -> NameCandidate {
        let (name, source) = if let Some(seed) = seed.filter(|s| is_usable_name(s)) {
            (seed.trim().to_owned(), NameSource::Neighbor)
        } else if let Some(swept) = self.neighbors.lookup(ip).filter(|n| is_usable_name(n)) {
            (swept, NameSource::Neighbor)
        } else if let Some(brand) = mac
            .and_then(|m| self.vendors.vendor_for(m))
            .and_then(|vendor| short_brand(&vendor).map(str::to_owned))
        {
            (brand, NameSource::Vendor)
        } else {
            (ip.to_string(), NameSource::Address)
        };

        NameCandidate {
            name: format!("{NAME_PREFIX}{name}"),
            source,
        }
    }

    /// Resolve and deduplicate against every record except `id`.
    pub fn resolve_name(
        &self,
        registry: &Registry,
        id: &DeviceId,
        ip: Ipv4Addr,
        mac: Option<&MacAddress>,
        seed: Option<&str>,
    ) -> String {
        let candidate = self.candidate(ip, mac, seed);
        registry.unique_name(&candidate.name, Some(id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::vendor::OuiTable;
    use std::collections::HashSet;

    fn resolver(neighbors: Vec<DiscoveredName>) -> NameResolver {
        let mut table = OuiTable::new();
        table.insert("00:1A:11", "Google, Inc.");
        let names = Arc::new(NeighborNames::new());
        names.replace_all(neighbors);
        NameResolver::new(names, Arc::new(table))
    }

    fn discovered(ip: [u8; 4], name: &str) -> DiscoveredName {
        DiscoveredName {
            ip: Ipv4Addr::from(ip),
            name: name.into(),
            mac: None,
            infrastructure: false,
        }
    }

    #[test]
    fn dedup_picks_smallest_free_suffix() {
        let taken: HashSet<&str> = ["Presence - Apple", "Presence - Apple 2", "Presence - Apple 4"]
            .into_iter()
            .collect();
        assert_eq!(
            deduplicate("Presence - Apple", |n| taken.contains(n)),
            "Presence - Apple 3"
        );
        assert_eq!(deduplicate("Presence - Dell", |n| taken.contains(n)), "Presence - Dell");
    }

    #[test]
    fn dedup_is_bounded() {
        let name = deduplicate("busy", |_| true);
        assert_eq!(name, format!("busy {MAX_NAME_ATTEMPTS}"));
    }

    #[test]
    fn seed_hostname_wins() {
        let r = resolver(vec![discovered([192, 168, 1, 10], "swept")]);
        let c = r.candidate(Ipv4Addr::new(192, 168, 1, 10), None, Some("kitchen-pi"));
        assert_eq!(c.name, "Presence - kitchen-pi");
        assert_eq!(c.source, NameSource::Neighbor);
    }

    #[test]
    fn swept_name_beats_vendor() {
        let r = resolver(vec![discovered([192, 168, 1, 10], "Living Room")]);
        let mac = MacAddress::parse("00:1a:11:00:00:01").unwrap();
        let c = r.candidate(Ipv4Addr::new(192, 168, 1, 10), Some(&mac), Some("?"));
        assert_eq!(c.name, "Presence - Living Room");
    }

    #[test]
    fn vendor_brand_then_ip_literal() {
        let r = resolver(Vec::new());
        let google = MacAddress::parse("00:1a:11:00:00:01").unwrap();
        let unknown = MacAddress::parse("02:00:00:00:00:01").unwrap();
        let ip = Ipv4Addr::new(192, 168, 1, 10);

        let c = r.candidate(ip, Some(&google), None);
        assert_eq!(c.name, "Presence - Google");
        assert_eq!(c.source, NameSource::Vendor);

        let c = r.candidate(ip, Some(&unknown), None);
        assert_eq!(c.name, "Presence - 192.168.1.10");
        assert_eq!(c.source, NameSource::Address);
    }

    #[test]
    fn resolve_name_skips_names_held_by_other_devices() {
        let r = resolver(Vec::new());
        let registry = Registry::new();
        let now = chrono::Utc::now();
        let first = MacAddress::parse("00:1a:11:00:00:01").unwrap();
        let second = MacAddress::parse("00:1a:11:00:00:02").unwrap();
        let first_id = DeviceId::from_mac(&first);
        let ip = Ipv4Addr::new(192, 168, 1, 10);

        registry.upsert(
            &first_id,
            crate::model::DeviceUpdate {
                mac: Some(first.clone()),
                ip: Some(ip),
                name: Some(r.candidate(ip, Some(&first), None)),
                seen_at: None,
                infrastructure: false,
            },
            now,
        );

        assert_eq!(
            r.resolve_name(&registry, &first_id, ip, Some(&first), None),
            "Presence - Google"
        );
        assert_eq!(
            r.resolve_name(&registry, &DeviceId::from_mac(&second), ip, Some(&second), None),
            "Presence - Google 2"
        );
    }

    #[test]
    fn first_source_wins_per_address() {
        let names = NeighborNames::new();
        names.replace_all(vec![
            discovered([10, 0, 0, 1], "from-avahi"),
            discovered([10, 0, 0, 1], "FROM-NETBIOS"),
        ]);
        assert_eq!(names.lookup(Ipv4Addr::new(10, 0, 0, 1)).as_deref(), Some("from-avahi"));

        names.replace_all(Vec::new());
        assert!(names.is_empty());
    }
}
