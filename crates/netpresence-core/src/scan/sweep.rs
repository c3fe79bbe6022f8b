//! Background mDNS / NetBIOS name sweep.
//!
//! Runs every configured [`NameDiscovery`] source in order and swaps the
//! result into the shared neighbor-name table. Sources that also report a
//! MAC upsert the device directly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::{ScanContext, Sighting};
use crate::names::NameDiscovery;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub names: usize,
    pub infrastructure: usize,
    pub devices_updated: usize,
}

pub async fn run(
    ctx: &ScanContext,
    sources: &[Arc<dyn NameDiscovery>],
    now: DateTime<Utc>,
) -> SweepReport {
    let mut found = Vec::new();
    for source in sources {
        let names = source.discover().await;
        debug!(source = source.label(), count = names.len(), "name sweep source finished");
        found.extend(names);
    }

    let mut report = SweepReport::default();
    for entry in &found {
        if entry.infrastructure {
            report.infrastructure += 1;
        }
        let Some(mac) = entry.mac.as_ref() else {
            continue;
        };
        let sighting = Sighting {
            ip: entry.ip,
            mac,
            hostname: Some(&entry.name),
            alive: false,
            infrastructure: entry.infrastructure,
        };
        ctx.merge_sighting(&sighting, now);
        report.devices_updated += 1;
    }

    ctx.resolver.neighbors().replace_all(found);
    report.names = ctx.resolver.neighbors().len();
    report
}
