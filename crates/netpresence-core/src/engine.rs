// ── Presence engine ──
//
// Cheaply cloneable facade over the registry, the scan strategies, and
// the host bridge. `start` spawns the clock and name-sweep tasks;
// `shutdown` cancels them, joins them, and flushes the registry.

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PresenceConfig;
use crate::error::CoreError;
use crate::host::{HostBridge, HostSink};
use crate::model::{DeviceId, DeviceRecord, mute_deadline};
use crate::names::{NameDiscovery, NameResolver, NeighborNames};
use crate::net::LocalNetwork;
use crate::probe::Prober;
use crate::scan::{
    self, BruteForceReport, BusyFlag, NeighborScanReport, RecheckReport, ScanContext, SweepReport,
};
use crate::store::{Registry, RegistryStore};
use crate::vendor::VendorLookup;

/// The external collaborators an engine runs against.
pub struct Collaborators {
    pub prober: Arc<dyn Prober>,
    pub host: Arc<dyn HostSink>,
    pub store: Arc<dyn RegistryStore>,
    pub vendors: Arc<dyn VendorLookup>,
    pub name_sources: Vec<Arc<dyn NameDiscovery>>,
}

/// When each periodic job last ran.
#[derive(Debug)]
struct Schedule {
    last_brute_force: Option<Instant>,
    last_neighbor_scan: Option<Instant>,
    last_prune: Instant,
    brute_force_cycle: u32,
    /// Outcome of the most recent re-check pass.
    all_adopted_live: bool,
}

/// The presence engine.
///
/// Owns the device registry and drives every scan. All methods are safe to
/// call concurrently; strategies are individually busy-guarded.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    ctx: Arc<ScanContext>,
    store: Arc<dyn RegistryStore>,
    name_sources: Vec<Arc<dyn NameDiscovery>>,
    neighbor_busy: BusyFlag,
    brute_force_busy: BusyFlag,
    recheck_busy: BusyFlag,
    sweep_busy: BusyFlag,
    schedule: std::sync::Mutex<Schedule>,
    cancel: CancellationToken,
    /// Child token for the current run; replaced on every `start`.
    cancel_child: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Build an engine and load the persisted registry. Every loaded device
    /// is registered with the host right away.
    pub fn new(config: PresenceConfig, network: LocalNetwork, collaborators: Collaborators) -> Self {
        let Collaborators {
            prober,
            host,
            store,
            vendors,
            name_sources,
        } = collaborators;

        let registry = Arc::new(Registry::load_from(store.as_ref()));
        let resolver = NameResolver::new(Arc::new(NeighborNames::new()), vendors);
        let host = Arc::new(HostBridge::new(host, config.show_infrastructure));

        for record in registry.snapshot() {
            host.register(&record);
        }
        info!(devices = registry.len(), "presence engine ready");

        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Self {
            inner: Arc::new(EngineInner {
                ctx: Arc::new(ScanContext {
                    config,
                    network,
                    registry,
                    resolver,
                    prober,
                    host,
                }),
                store,
                name_sources,
                neighbor_busy: BusyFlag::new(),
                brute_force_busy: BusyFlag::new(),
                recheck_busy: BusyFlag::new(),
                sweep_busy: BusyFlag::new(),
                schedule: std::sync::Mutex::new(Schedule {
                    last_brute_force: None,
                    last_neighbor_scan: None,
                    last_prune: Instant::now(),
                    brute_force_cycle: 0,
                    all_adopted_live: false,
                }),
                cancel,
                cancel_child: Mutex::new(cancel_child),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &PresenceConfig {
        &self.inner.ctx.config
    }

    pub fn network(&self) -> &LocalNetwork {
        &self.inner.ctx.network
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.ctx.registry
    }

    pub fn host(&self) -> &Arc<HostBridge> {
        &self.inner.ctx.host
    }

    /// All records, ordered by identity.
    pub fn devices(&self) -> Vec<DeviceRecord> {
        self.registry().snapshot()
    }

    fn schedule(&self) -> std::sync::MutexGuard<'_, Schedule> {
        self.inner
            .schedule
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the name sweep, an initial neighbor scan, and the clock.
    pub async fn start(&self) {
        let cancel = {
            let mut child = self.inner.cancel_child.lock().await;
            if child.is_cancelled() {
                *child = self.inner.cancel.child_token();
            }
            child.clone()
        };
        let tuning = &self.config().scan;

        let mut handles = self.inner.task_handles.lock().await;
        if !self.inner.name_sources.is_empty() {
            handles.push(tokio::spawn(sweep_task(
                self.clone(),
                tuning.name_sweep_interval,
                cancel.clone(),
            )));
        }
        let engine = self.clone();
        handles.push(tokio::spawn(cancellable(cancel.clone(), async move {
            engine.run_neighbor_scan().await;
        })));
        handles.push(tokio::spawn(clock_task(
            self.clone(),
            tuning.tick_interval,
            cancel,
        )));
        info!(
            tick = ?tuning.tick_interval,
            brute_force = self.config().use_brute_force,
            "presence engine started"
        );
    }

    /// Cancel background work, wait for it, and save the registry.
    pub async fn shutdown(&self) -> Result<(), CoreError> {
        self.inner.cancel_child.lock().await.cancel();

        let handles = std::mem::take(&mut *self.inner.task_handles.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "background task failed");
            }
        }

        self.save_now()?;
        debug!("presence engine stopped");
        Ok(())
    }

    /// Neighbor scan plus brute-force scan right now, in the background.
    pub async fn start_pairing(&self) {
        info!("pairing requested, scanning now");
        let cancel = self.inner.cancel_child.lock().await.clone();
        let neighbor = self.clone();
        let brute = self.clone();
        let mut handles = self.inner.task_handles.lock().await;
        handles.retain(|h| !h.is_finished());
        handles.push(tokio::spawn(cancellable(cancel.clone(), async move {
            neighbor.run_neighbor_scan().await;
        })));
        handles.push(tokio::spawn(cancellable(cancel, async move {
            brute.run_brute_force_scan().await;
        })));
    }

    // ── Clock ────────────────────────────────────────────────────────

    /// One clock tick: maybe start scans, re-check adopted devices, publish
    /// properties, prune, and persist.
    pub async fn tick(&self) {
        let config = self.config();
        let tuning = &config.scan;
        let now = Instant::now();

        let (brute_force_due, neighbor_due, prune_due) = {
            let schedule = self.schedule();
            let elapsed = |last: Option<Instant>, every: Duration| {
                last.is_none_or(|t| now.saturating_duration_since(t) >= every)
            };
            (
                config.use_brute_force
                    && !schedule.all_adopted_live
                    && elapsed(schedule.last_brute_force, tuning.brute_force_interval),
                elapsed(schedule.last_neighbor_scan, tuning.neighbor_scan_interval),
                !config.use_brute_force
                    && elapsed(Some(schedule.last_prune), tuning.brute_force_interval),
            )
        };

        let cancel = self.inner.cancel_child.lock().await.clone();
        if (brute_force_due || neighbor_due) && !cancel.is_cancelled() {
            let mut handles = self.inner.task_handles.lock().await;
            handles.retain(|h| !h.is_finished());
            if brute_force_due && !self.inner.brute_force_busy.is_running() {
                let engine = self.clone();
                handles.push(tokio::spawn(cancellable(cancel.clone(), async move {
                    engine.run_brute_force_scan().await;
                })));
            }
            if neighbor_due {
                let engine = self.clone();
                handles.push(tokio::spawn(cancellable(cancel, async move {
                    engine.run_neighbor_scan().await;
                })));
            }
        }

        self.run_recheck().await;
        self.publish_liveness();

        if prune_due {
            self.prune();
            self.schedule().last_prune = now;
        }
        if let Err(e) = self.persist_if_dirty() {
            warn!(error = %e, "failed to persist registry");
        }
    }

    // ── Strategies ───────────────────────────────────────────────────

    /// Passive ARP/neighbor cache scan. `None` if one is already running.
    pub async fn run_neighbor_scan(&self) -> Option<NeighborScanReport> {
        let Some(_guard) = self.inner.neighbor_busy.try_acquire() else {
            debug!("neighbor scan already running, skipping");
            return None;
        };
        self.schedule().last_neighbor_scan = Some(Instant::now());
        Some(scan::neighbor::run(&self.inner.ctx, Utc::now()).await)
    }

    /// Full /24 probe. `None` if one is already running.
    pub async fn run_brute_force_scan(&self) -> Option<BruteForceReport> {
        let Some(_guard) = self.inner.brute_force_busy.try_acquire() else {
            debug!("brute-force scan already running, skipping");
            return None;
        };
        let cycle = {
            let mut schedule = self.schedule();
            schedule.last_brute_force = Some(Instant::now());
            schedule.last_prune = Instant::now();
            schedule.brute_force_cycle += 1;
            schedule.brute_force_cycle
        };
        let report = scan::brute_force::run(Arc::clone(&self.inner.ctx), cycle).await;
        if let Err(e) = self.persist_if_dirty() {
            warn!(error = %e, "failed to persist registry after brute-force scan");
        }
        Some(report)
    }

    pub async fn run_recheck(&self) -> Option<RecheckReport> {
        self.run_recheck_at(Utc::now()).await
    }

    /// Targeted re-check of adopted devices as of `now`.
    pub async fn run_recheck_at(&self, now: DateTime<Utc>) -> Option<RecheckReport> {
        let Some(_guard) = self.inner.recheck_busy.try_acquire() else {
            debug!("re-check already running, skipping");
            return None;
        };
        let report = scan::recheck::run(&self.inner.ctx, now).await;
        self.schedule().all_adopted_live = report.all_live();
        Some(report)
    }

    /// One pass over every name source. `None` if one is already running.
    pub async fn run_name_sweep(&self) -> Option<SweepReport> {
        let Some(_guard) = self.inner.sweep_busy.try_acquire() else {
            debug!("name sweep already running, skipping");
            return None;
        };
        let report = scan::sweep::run(&self.inner.ctx, &self.inner.name_sources, Utc::now()).await;
        info!(names = report.names, "name sweep finished");
        Some(report)
    }

    // ── Host reporting ───────────────────────────────────────────────

    pub fn publish_liveness(&self) {
        self.publish_liveness_at(Utc::now());
    }

    /// Register any unregistered record and forward changed properties.
    pub fn publish_liveness_at(&self, now: DateTime<Utc>) {
        let window = self.inner.ctx.window();
        for record in self.registry().snapshot() {
            self.host().register(&record);
            self.host().publish(&record, now, window);
        }
    }

    // ── Pruning & persistence ────────────────────────────────────────

    pub fn prune(&self) -> usize {
        self.prune_at(Utc::now())
    }

    pub fn prune_at(&self, now: DateTime<Utc>) -> usize {
        let horizon = chrono::Duration::from_std(self.config().scan.candidate_retention)
            .unwrap_or(chrono::Duration::MAX);
        let removed = self.registry().prune(now, horizon);
        for record in &removed {
            self.host().forget(&record.id);
        }
        removed.len()
    }

    /// Save when something changed since the last save. Returns whether a
    /// save happened.
    pub fn persist_if_dirty(&self) -> Result<bool, CoreError> {
        if !self.registry().take_dirty() {
            return Ok(false);
        }
        self.inner
            .store
            .save(&self.registry().to_snapshot())
            .inspect_err(|_| self.registry().mark_dirty())?;
        Ok(true)
    }

    pub fn save_now(&self) -> Result<(), CoreError> {
        self.registry().take_dirty();
        self.inner
            .store
            .save(&self.registry().to_snapshot())
            .inspect_err(|_| self.registry().mark_dirty())
    }

    // ── Inbound host notifications ───────────────────────────────────

    /// The user accepted a device as a thing.
    pub fn device_saved(
        &self,
        id: &str,
        title: Option<&str>,
        ip: Option<std::net::Ipv4Addr>,
    ) -> Result<(), CoreError> {
        if !DeviceId::is_presence_id(id) {
            debug!(id, "ignoring thing from another adapter");
            return Ok(());
        }
        let id = DeviceId::from(id);
        let now = Utc::now();
        let seeded = self.registry().mark_adopted(&id, title, ip, now);
        info!(id = %id, seeded, "device adopted");

        let record = self
            .registry()
            .get(&id)
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: id.to_string(),
            })?;
        self.host().register(&record);
        self.host().publish(&record, now, self.inner.ctx.window());
        Ok(())
    }

    /// The user deleted a thing: drop the record and tell the host.
    pub fn remove_device(&self, id: &DeviceId) -> Result<DeviceRecord, CoreError> {
        let removed = self
            .registry()
            .remove(id)
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: id.to_string(),
            })?;
        self.host().remove(id);
        info!(id = %id, name = %removed.display_name, "device removed");
        Ok(removed)
    }

    pub fn set_data_collection(&self, id: &DeviceId, enabled: bool) -> Result<(), CoreError> {
        if !self.registry().set_data_collection(id, enabled) {
            return Err(CoreError::DeviceNotFound {
                identifier: id.to_string(),
            });
        }
        debug!(id = %id, enabled, "data collection toggled");
        self.publish_one(id, Utc::now());
        Ok(())
    }

    /// Silence a device for `duration`. A zero duration lifts the mute.
    /// Returns the new mute deadline.
    pub fn mute(&self, id: &DeviceId, duration: Duration) -> Result<Option<DateTime<Utc>>, CoreError> {
        let now = Utc::now();
        let until = mute_deadline(now, duration);
        if !self.registry().set_mute_until(id, until) {
            return Err(CoreError::DeviceNotFound {
                identifier: id.to_string(),
            });
        }
        info!(id = %id, ?until, "mute updated");
        self.publish_one(id, now);
        Ok(until)
    }

    fn publish_one(&self, id: &DeviceId, now: DateTime<Utc>) {
        if let Some(record) = self.registry().get(id) {
            self.host().publish(&record, now, self.inner.ctx.window());
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Run `work` until it finishes or `cancel` fires, whichever is first.
async fn cancellable(cancel: CancellationToken, work: impl Future<Output = ()>) {
    tokio::select! {
        biased;
        () = cancel.cancelled() => {}
        () = work => {}
    }
}

async fn clock_task(engine: Engine, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => engine.tick().await,
        }
    }
    debug!("clock task stopped");
}

async fn sweep_task(engine: Engine, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                engine.run_name_sweep().await;
            }
        }
    }
    debug!("name sweep task stopped");
}
