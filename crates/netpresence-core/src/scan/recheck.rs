//! Targeted re-check of adopted devices.
//!
//! One ping, then one ARP request, per adopted device that has an address,
//! has data collection enabled, and is not muted. Runs inline on every
//! clock tick.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, trace};

use super::ScanContext;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecheckReport {
    pub probed: usize,
    pub live: usize,
    pub failed: usize,
    pub muted: usize,
    pub disabled: usize,
    pub no_address: usize,
}

impl RecheckReport {
    /// At least one adopted device was probed and every one answered.
    pub fn all_live(&self) -> bool {
        self.probed > 0 && self.failed == 0
    }
}

pub async fn run(ctx: &ScanContext, now: DateTime<Utc>) -> RecheckReport {
    let mut report = RecheckReport::default();

    for id in ctx.registry.adopted_ids() {
        let Some(record) = ctx.registry.get(&id) else {
            continue;
        };
        if record.is_muted(now) {
            trace!(id = %id, "muted, skipping");
            report.muted += 1;
            continue;
        }
        if !record.data_collection_enabled {
            report.disabled += 1;
            continue;
        }
        let Some(ip) = record.ip else {
            report.no_address += 1;
            continue;
        };

        report.probed += 1;
        let mut alive = ctx.prober.ping(ip, 1).await;
        if !alive && !ctx.config.is_arping_excluded(ip, record.mac.as_ref()) {
            alive = ctx.prober.arp_request(ip, 1).await;
        }

        if alive {
            ctx.registry.mark_seen(&id, now);
            report.live += 1;
        } else {
            let since = ctx.registry.record_probe_failure(&id, now);
            trace!(id = %id, %ip, ?since, "re-check failed");
            report.failed += 1;
        }
    }

    debug!(
        probed = report.probed,
        live = report.live,
        failed = report.failed,
        "re-check finished"
    );
    report
}
