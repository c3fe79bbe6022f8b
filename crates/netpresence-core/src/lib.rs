//! Network presence discovery and tracking engine.
//!
//! Probes the local /24 with ICMP echo and ARP tooling, correlates answers
//! by MAC address, and keeps one durable record per physical device:
//!
//! - **[`Engine`]**: Cloneable facade. [`start()`](Engine::start) spawns the
//!   clock (targeted re-check every tick, periodic neighbor and brute-force
//!   scans, pruning, persistence) and the background name sweep.
//!   [`shutdown()`](Engine::shutdown) cancels, joins, and flushes.
//!
//! - **[`Registry`]**: The only shared mutable structure: a mutex-guarded
//!   map from MAC-derived [`DeviceId`] to [`DeviceRecord`]. All merges go
//!   through [`Registry::upsert`], which is safe under concurrent shard
//!   workers.
//!
//! - **Scan strategies** ([`scan`]): neighbor-cache scan, sharded
//!   brute-force scan, targeted re-check, and name sweep, each behind its
//!   own [`BusyFlag`](scan::BusyFlag).
//!
//! - **Seams**: [`Prober`] (probe tools), [`HostSink`] (the host "thing"
//!   framework), [`RegistryStore`] (persistence), [`VendorLookup`] (OUI
//!   table), and [`NameDiscovery`] (mDNS / NetBIOS sweeps).

pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod model;
pub mod names;
pub mod net;
pub mod probe;
pub mod scan;
pub mod store;
pub mod vendor;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{InterfacePreference, PresenceConfig, ScanTuning};
pub use engine::{Collaborators, Engine};
pub use error::CoreError;
pub use host::{DeviceHandle, HostBridge, HostSink, Property, PropertyValue};
pub use model::{
    DeviceId, DeviceRecord, DeviceUpdate, MacAddress, NameCandidate, NameSource, mute_deadline,
    normalize_mac,
};
pub use names::{AvahiBrowse, NameDiscovery, NameResolver, NbtScan, NeighborNames};
pub use net::LocalNetwork;
pub use probe::{
    ArpEntry, NeighborEntry, NeighborState, ProbeTool, Prober, SystemProber, SystemProberOptions,
};
pub use scan::{BruteForceReport, NeighborScanReport, RecheckReport, SweepReport};
pub use store::{JsonFileStore, MemoryStore, Registry, RegistrySnapshot, RegistryStore};
pub use vendor::{OuiTable, VendorLookup};
