//! Parsers for the text output of `arp`, `ip neighbor`, `avahi-browse`,
//! and `nbtscan`.
//!
//! Kept free of I/O so each format can be tested against captured output.

use std::net::Ipv4Addr;

use super::{ArpEntry, NeighborEntry, NeighborState};
use crate::model::MacAddress;

/// Find the first token on a line that is a usable MAC address.
pub fn extract_mac(line: &str) -> Option<MacAddress> {
    line.split_whitespace()
        .filter(|token| token.contains(':') || token.contains('-'))
        .filter_map(|token| MacAddress::parse(token).ok())
        .find(|mac| !mac.is_placeholder())
}

/// Find the first IPv4 literal on a line, tolerating `(…)` wrapping.
pub fn extract_ipv4(line: &str) -> Option<Ipv4Addr> {
    line.split_whitespace()
        .map(|token| token.trim_matches(|c| c == '(' || c == ')'))
        .find_map(|token| token.parse().ok())
}

/// One line of `arp -a` (`host (192.168.1.5) at aa:bb:… [ether] on eth0`)
/// or `arp -n` (`192.168.1.5  ether  aa:bb:…  C  eth0`).
pub fn parse_arp_line(line: &str) -> Option<ArpEntry> {
    if line.contains("incomplete") || line.starts_with("Address") {
        return None;
    }
    let ip = extract_ipv4(line)?;
    let mac = extract_mac(line)?;

    let first = line.split_whitespace().next()?;
    let hostname = (line.contains(" at ") && !first.starts_with('('))
        .then(|| first.to_owned())
        .filter(|name| is_usable_name(name));

    Some(ArpEntry { ip, mac, hostname })
}

/// Every resolved entry in `arp -a` / `arp -n` output.
pub fn parse_arp_output(output: &str) -> Vec<ArpEntry> {
    output.lines().filter_map(parse_arp_line).collect()
}

/// One line of `ip neighbor show`
/// (`192.168.1.5 dev eth0 lladdr aa:bb:cc:dd:ee:ff REACHABLE`).
pub fn parse_neighbor_line(line: &str) -> Option<NeighborEntry> {
    let mut tokens = line.split_whitespace();
    let ip: Ipv4Addr = tokens.next()?.parse().ok()?;
    let mut mac = None;
    let mut state = None;
    while let Some(token) = tokens.next() {
        if token == "lladdr" {
            mac = tokens.next().and_then(|raw| MacAddress::parse(raw).ok());
        } else if let Ok(parsed) = token.parse::<NeighborState>() {
            state = Some(parsed);
        }
    }
    let mac = mac.filter(|m| !m.is_placeholder())?;
    Some(NeighborEntry {
        ip,
        mac,
        state: state?,
    })
}

pub fn parse_neighbor_output(output: &str) -> Vec<NeighborEntry> {
    output.lines().filter_map(parse_neighbor_line).collect()
}

/// A name reported by an mDNS or NetBIOS sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredName {
    pub ip: Ipv4Addr,
    pub name: String,
    pub mac: Option<MacAddress>,
    pub infrastructure: bool,
}

/// Resolved `avahi-browse -p -r` lines:
/// `=;iface;IPv4;Instance\032Name;_type._tcp;local;host.local;192.168.1.20;80;"txt"`.
///
/// Instance names starting with any of `markers` flag the address as
/// infrastructure; the marker is replaced with `Candle `. A MAC is only
/// taken from a colon-separated token anywhere on the line.
pub fn parse_avahi_output(output: &str, markers: &[String]) -> Vec<DiscoveredName> {
    let mut found: Vec<DiscoveredName> = Vec::new();
    for line in output.lines() {
        let fields: Vec<&str> = line.split(';').collect();
        if fields.first() != Some(&"=") || fields.get(2) != Some(&"IPv4") {
            continue;
        }
        let (Some(instance), Some(ip)) = (
            fields.get(3),
            fields.get(7).and_then(|raw| raw.parse::<Ipv4Addr>().ok()),
        ) else {
            continue;
        };

        let decoded = decode_avahi_escapes(instance);
        let marker = markers.iter().find(|m| decoded.starts_with(m.as_str()));
        let name = match marker {
            Some(m) => format!("Candle {}", decoded.trim_start_matches(m.as_str())),
            None => decoded,
        };
        if !is_usable_name(&name) || found.iter().any(|d| d.ip == ip) {
            continue;
        }
        found.push(DiscoveredName {
            ip,
            name,
            mac: colon_mac_in(line),
            infrastructure: marker.is_some(),
        });
    }
    found
}

/// First `xx:xx:xx:xx:xx:xx` token (1-2 hex digits per group) in `text`.
fn colon_mac_in(text: &str) -> Option<MacAddress> {
    text.split(|c: char| !(c.is_ascii_hexdigit() || c == ':'))
        .filter(|token| {
            let groups: Vec<&str> = token.split(':').collect();
            groups.len() == 6 && groups.iter().all(|g| (1..=2).contains(&g.len()))
        })
        .find_map(|token| MacAddress::parse(token).ok())
}

/// avahi escapes spaces as `\032` and `@` as `\064`; anything after any
/// other escape is service noise.
fn decode_avahi_escapes(raw: &str) -> String {
    let decoded = raw.replace("\\032", " ").replace("\\064", "-");
    decoded
        .split('\\')
        .next()
        .unwrap_or_default()
        .trim()
        .to_owned()
}

/// `nbtscan -q -e` lines: `192.168.1.30<TAB>DESKTOP-ABC`.
pub fn parse_nbtscan_output(output: &str) -> Vec<DiscoveredName> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.trim_end().split('\t');
            let ip = parts.next()?.trim().parse().ok()?;
            let name = parts.next()?.trim();
            is_usable_name(name).then(|| DiscoveredName {
                ip,
                name: name.to_owned(),
                mac: None,
                infrastructure: false,
            })
        })
        .collect()
}

/// A name worth showing: not empty, not a placeholder, not an IP literal.
pub fn is_usable_name(name: &str) -> bool {
    let name = name.trim();
    !(name.is_empty()
        || name == "?"
        || name.eq_ignore_ascii_case("unnamed")
        || name.parse::<Ipv4Addr>().is_ok())
}
