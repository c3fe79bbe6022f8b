//! Passive scan of the kernel ARP and neighbor caches.
//!
//! No new probes are sent; this only reads what the OS already knows, so it
//! runs at startup and every few minutes. Only `REACHABLE` neighbors count
//! as a fresh sighting; cached entries refresh address and name.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::{ScanContext, Sighting};
use crate::model::DeviceId;
use crate::probe::NeighborState;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NeighborScanReport {
    /// Cache entries considered after filtering.
    pub entries: usize,
    pub new_devices: Vec<DeviceId>,
    pub updated: usize,
}

pub async fn run(ctx: &ScanContext, now: DateTime<Utc>) -> NeighborScanReport {
    let arp = ctx.prober.dump_arp_cache().await;
    let neighbors = ctx.prober.neighbor_table().await;

    let mut report = NeighborScanReport::default();
    let mut handled = HashSet::new();

    // Neighbor table first: it carries reachability state.
    for entry in neighbors.iter().filter(|n| n.state.is_usable()) {
        if entry.ip == ctx.network.own_ip || !handled.insert(entry.ip) {
            continue;
        }
        let hostname = arp
            .iter()
            .find(|a| a.ip == entry.ip)
            .and_then(|a| a.hostname.as_deref());
        let sighting = Sighting {
            ip: entry.ip,
            mac: &entry.mac,
            hostname,
            alive: entry.state == NeighborState::Reachable,
            infrastructure: false,
        };
        tally(&mut report, ctx.merge_sighting(&sighting, now));
    }

    for entry in &arp {
        if entry.ip == ctx.network.own_ip || !handled.insert(entry.ip) {
            continue;
        }
        let sighting = Sighting {
            ip: entry.ip,
            mac: &entry.mac,
            hostname: entry.hostname.as_deref(),
            alive: false,
            infrastructure: false,
        };
        tally(&mut report, ctx.merge_sighting(&sighting, now));
    }

    debug!(
        entries = report.entries,
        new = report.new_devices.len(),
        "neighbor scan finished"
    );
    report
}

fn tally(report: &mut NeighborScanReport, (id, is_new): (DeviceId, bool)) {
    report.entries += 1;
    if is_new {
        report.new_devices.push(id);
    } else {
        report.updated += 1;
    }
}
