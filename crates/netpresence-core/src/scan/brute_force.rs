// ── Brute-force subnet scan ──
//
// Probes every address of the local /24. The range is split into
// contiguous shards, one task per shard in a JoinSet; within a shard
// addresses go in ascending order, paced by `probe_spacing`.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

use super::{ScanContext, Sighting};
use crate::config::ScanTuning;
use crate::model::{DeviceId, MacAddress};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BruteForceReport {
    pub cycle: u32,
    pub deep_pass: bool,
    pub probed: usize,
    pub alive: Vec<Ipv4Addr>,
    pub new_devices: Vec<DeviceId>,
    pub failed_shards: usize,
    pub pruned: usize,
}

/// Split `hosts` into `count` contiguous runs whose sizes differ by at
/// most one. Order is preserved; empty shards are not produced.
pub fn partition(hosts: &[Ipv4Addr], count: usize) -> Vec<Vec<Ipv4Addr>> {
    if hosts.is_empty() {
        return Vec::new();
    }
    let count = count.clamp(1, hosts.len());
    let base = hosts.len() / count;
    let extra = hosts.len() % count;

    let mut shards = Vec::with_capacity(count);
    let mut start = 0;
    for i in 0..count {
        let len = base + usize::from(i < extra);
        shards.push(hosts[start..start + len].to_vec());
        start += len;
    }
    shards
}

/// Whether cycle `cycle` (1-based) probes every address at full depth.
pub fn is_deep_pass(tuning: &ScanTuning, cycle: u32) -> bool {
    tuning.deep_pass_every > 0 && cycle % tuning.deep_pass_every == 0
}

/// Attempts for one address: more for known devices, most on a deep pass.
pub fn attempts_for(tuning: &ScanTuning, deep: bool, interested: bool) -> u32 {
    if deep {
        tuning.deep_attempts
    } else if interested {
        tuning.interested_attempts
    } else {
        tuning.base_attempts
    }
}

#[derive(Default)]
struct ShardOutcome {
    probed: usize,
    alive: Vec<Ipv4Addr>,
    new_devices: Vec<DeviceId>,
}

/// Run one full pass and wait for every shard. Prunes afterwards.
pub async fn run(ctx: Arc<ScanContext>, cycle: u32) -> BruteForceReport {
    let deep = is_deep_pass(&ctx.config.scan, cycle);
    let hosts = ctx.network.hosts();
    let known = Arc::new(ctx.registry.known_addresses());
    let before = ctx.registry.len();

    info!(
        cycle,
        deep,
        subnet = %ctx.network.subnet,
        shards = ctx.config.scan.shard_count,
        "brute-force scan starting"
    );

    let mut shards = JoinSet::new();
    for shard in partition(&hosts, ctx.config.scan.shard_count) {
        shards.spawn(probe_shard(Arc::clone(&ctx), shard, Arc::clone(&known), deep));
    }

    let mut report = BruteForceReport {
        cycle,
        deep_pass: deep,
        ..BruteForceReport::default()
    };
    while let Some(joined) = shards.join_next().await {
        match joined {
            Ok(outcome) => {
                report.probed += outcome.probed;
                report.alive.extend(outcome.alive);
                report.new_devices.extend(outcome.new_devices);
            }
            Err(e) => {
                warn!(error = %e, "brute-force shard failed");
                report.failed_shards += 1;
            }
        }
    }
    report.alive.sort_unstable();

    if ctx.registry.len() > before {
        ctx.registry.mark_dirty();
    }
    let retention = chrono::Duration::from_std(ctx.config.scan.candidate_retention)
        .unwrap_or(chrono::Duration::MAX);
    let pruned = ctx.registry.prune(Utc::now(), retention);
    for record in &pruned {
        ctx.host.forget(&record.id);
    }
    report.pruned = pruned.len();

    info!(
        alive = report.alive.len(),
        new = report.new_devices.len(),
        pruned = report.pruned,
        "brute-force scan finished"
    );
    report
}

async fn probe_shard(
    ctx: Arc<ScanContext>,
    shard: Vec<Ipv4Addr>,
    known: Arc<HashMap<Ipv4Addr, Option<MacAddress>>>,
    deep: bool,
) -> ShardOutcome {
    let tuning = &ctx.config.scan;
    let mut outcome = ShardOutcome::default();

    for (i, ip) in shard.into_iter().enumerate() {
        if i > 0 && !tuning.probe_spacing.is_zero() {
            tokio::time::sleep(tuning.probe_spacing).await;
        }
        let known_mac = known.get(&ip);
        let attempts = attempts_for(tuning, deep, known_mac.is_some());
        outcome.probed += 1;

        let mut alive = ctx.prober.ping(ip, attempts).await;
        if !alive && !ctx.config.is_arping_excluded(ip, known_mac.and_then(Option::as_ref)) {
            alive = ctx.prober.arp_request(ip, attempts).await;
        }
        if !alive {
            trace!(%ip, "no answer");
            continue;
        }

        let Some(entry) = ctx.prober.arp_cache_entry(ip).await else {
            debug!(%ip, "answered but left no ARP entry");
            continue;
        };
        outcome.alive.push(ip);

        let sighting = Sighting {
            ip,
            mac: &entry.mac,
            hostname: entry.hostname.as_deref(),
            alive: true,
            infrastructure: false,
        };
        let (id, is_new) = ctx.merge_sighting(&sighting, Utc::now());
        if is_new {
            outcome.new_devices.push(id);
        }
    }
    outcome
}
