// ── Local network resolution ──
//
// Finds the address the scanner runs from and the /24 it covers.

use std::net::{IpAddr, Ipv4Addr};

use ipnetwork::Ipv4Network;
use network_interface::{NetworkInterface, NetworkInterfaceConfig};
use tracing::{debug, info};

use crate::config::{InterfacePreference, PresenceConfig};
use crate::error::CoreError;

/// Prefix length of the scanned range.
pub const SCAN_PREFIX: u8 = 24;

/// The scanner's own position on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalNetwork {
    pub interface: String,
    pub own_ip: Ipv4Addr,
    pub subnet: Ipv4Network,
}

impl LocalNetwork {
    pub fn new(interface: impl Into<String>, own_ip: Ipv4Addr) -> Result<Self, CoreError> {
        let subnet = Ipv4Network::new(own_ip, SCAN_PREFIX)
            .and_then(|net| Ipv4Network::new(net.network(), SCAN_PREFIX))
            .map_err(|e| CoreError::Interface(e.to_string()))?;
        Ok(Self {
            interface: interface.into(),
            own_ip,
            subnet,
        })
    }

    /// Resolve from the host's interfaces. A configured target address
    /// replaces the detected one but keeps the detected interface name.
    pub fn resolve(config: &PresenceConfig) -> Result<Self, CoreError> {
        let addresses: Vec<(String, Ipv4Addr)> = NetworkInterface::show()?
            .into_iter()
            .flat_map(|iface| {
                let name = iface.name;
                iface.addr.into_iter().filter_map(move |addr| match addr.ip() {
                    IpAddr::V4(v4) => Some((name.clone(), v4)),
                    IpAddr::V6(_) => None,
                })
            })
            .collect();

        let picked = pick_address(&addresses, config.preferred_interface);
        let network = match (config.target_ip_override, picked) {
            (Some(target), Some((iface, _))) => Self::new(iface, target)?,
            (Some(target), None) => {
                Self::new(config.preferred_interface.default_interface(), target)?
            }
            (None, Some((iface, ip))) => Self::new(iface, ip)?,
            (None, None) => {
                return Err(CoreError::NoLocalAddress {
                    interface: config.preferred_interface.default_interface().to_owned(),
                });
            }
        };
        info!(
            interface = %network.interface,
            own_ip = %network.own_ip,
            subnet = %network.subnet,
            "resolved local network"
        );
        Ok(network)
    }

    /// Every probe target: the /24 minus network, broadcast, and own address,
    /// ascending.
    pub fn hosts(&self) -> Vec<Ipv4Addr> {
        let network = self.subnet.network();
        let broadcast = self.subnet.broadcast();
        self.subnet
            .iter()
            .filter(|ip| *ip != network && *ip != broadcast && *ip != self.own_ip)
            .collect()
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.subnet.contains(ip)
    }
}

/// Choose the scanning address: the preferred link's conventional name,
/// then any interface of that link type, then any usable address.
pub fn pick_address(
    addresses: &[(String, Ipv4Addr)],
    preference: InterfacePreference,
) -> Option<(String, Ipv4Addr)> {
    let usable = |ip: &Ipv4Addr| !ip.is_loopback() && !ip.is_unspecified() && !ip.is_link_local();
    let link_prefixes: &[&str] = match preference {
        InterfacePreference::Wired => &["eth", "en"],
        InterfacePreference::Wireless => &["wlan", "wl"],
    };

    let exact = addresses
        .iter()
        .find(|(name, ip)| name == preference.default_interface() && usable(ip));
    let same_link = || {
        addresses.iter().find(|(name, ip)| {
            link_prefixes.iter().any(|p| name.starts_with(p)) && usable(ip)
        })
    };
    let any = || {
        addresses.iter().find(|(name, ip)| {
            !["lo", "docker", "veth", "br-"].iter().any(|p| name.starts_with(p)) && usable(ip)
        })
    };

    let picked = exact.or_else(same_link).or_else(any).cloned();
    debug!(?preference, ?picked, "picked scanning interface");
    picked
}
