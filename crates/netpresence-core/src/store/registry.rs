// ── Device registry ──
//
// One mutex around an ordered map. Name deduplication has to see every
// other record at assignment time, so a lock-free map is not enough here.

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use super::persist::{RegistrySnapshot, RegistryStore};
use crate::model::{DeviceId, DeviceRecord, DeviceUpdate, MacAddress, NameSource};
use crate::names::{NAME_PREFIX, deduplicate};

type Records = BTreeMap<DeviceId, DeviceRecord>;

/// Owned, internally synchronized map from identity to record.
#[derive(Debug, Default)]
pub struct Registry {
    records: Mutex<Records>,
    dirty: AtomicBool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry restored from a previous run. Liveness state is not carried
    /// over: `last_seen` and `not_seen_since` start unknown.
    pub fn restore(records: impl IntoIterator<Item = DeviceRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|mut record| {
                record.last_seen = None;
                record.not_seen_since = None;
                (record.id.clone(), record)
            })
            .collect();
        Self {
            records: Mutex::new(records),
            dirty: AtomicBool::new(false),
        }
    }

    /// Load through `store`. A missing, corrupt, or incompatible file gives an
    /// empty registry flagged dirty, so the next flush recreates the file.
    pub fn load_from(store: &dyn RegistryStore) -> Self {
        match store.load() {
            Ok(Some(snapshot)) => {
                debug!(devices = snapshot.devices.len(), "restored registry");
                Self::restore(snapshot.devices.into_values())
            }
            Ok(None) => {
                debug!("no persisted registry, starting empty");
                let fresh = Self::new();
                fresh.mark_dirty();
                fresh
            }
            Err(e) => {
                warn!(error = %e, "discarding unreadable registry");
                let fresh = Self::new();
                fresh.mark_dirty();
                fresh
            }
        }
    }

    /// Every record is left consistent between statements, so a panic in
    /// another holder does not invalidate the map.
    fn lock(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Read and clear the dirty flag.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn get(&self, id: &DeviceId) -> Option<DeviceRecord> {
        self.lock().get(id).cloned()
    }

    pub fn for_each(&self, mut f: impl FnMut(&DeviceRecord)) {
        for record in self.lock().values() {
            f(record);
        }
    }

    /// Point-in-time copy of every record, ordered by identity.
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        self.lock().values().cloned().collect()
    }

    pub fn to_snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot::new(self.lock().clone())
    }

    pub fn adopted_ids(&self) -> Vec<DeviceId> {
        self.lock()
            .values()
            .filter(|r| r.adopted)
            .map(|r| r.id.clone())
            .collect()
    }

    /// Address of every known record with its MAC, for scaling probe
    /// attempts and honoring MAC-based arping exclusions.
    pub fn known_addresses(&self) -> HashMap<Ipv4Addr, Option<MacAddress>> {
        self.lock()
            .values()
            .filter_map(|r| r.ip.map(|ip| (ip, r.mac.clone())))
            .collect()
    }

    /// Smallest unused variant of `candidate`, ignoring `exclude`'s own name.
    pub fn unique_name(&self, candidate: &str, exclude: Option<&DeviceId>) -> String {
        unique_in(&self.lock(), candidate, exclude)
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Merge an observation. Returns `true` when the identity was new.
    ///
    /// `ip` is last-writer-wins, `last_seen` keeps the later sighting
    /// (clamped to `now`), a name is only replaced by a strictly better
    /// source, and `mac` is filled in if absent.
    pub fn upsert(&self, id: &DeviceId, update: DeviceUpdate, now: DateTime<Utc>) -> bool {
        let mut records = self.lock();
        let seen_at = update.seen_at.map(|t| t.min(now));

        let Some(record) = records.get_mut(id) else {
            let candidate = update.name.map_or_else(
                || (fallback_name(id, update.ip), NameSource::Address),
                |c| (c.name, c.source),
            );
            let name = unique_in(&records, &candidate.0, None);
            let mut record = DeviceRecord::new(id.clone(), name, candidate.1, now);
            record.mac = update.mac;
            record.ip = update.ip;
            record.last_seen = seen_at;
            record.infrastructure = update.infrastructure;
            records.insert(id.clone(), record);
            drop(records);
            self.mark_dirty();
            return true;
        };

        if record.mac.is_none() {
            record.mac = update.mac;
        }
        if update.ip.is_some() {
            record.ip = update.ip;
        }
        if let Some(seen) = seen_at {
            record.last_seen = Some(record.last_seen.map_or(seen, |prev| prev.max(seen)));
            record.not_seen_since = None;
        }
        record.infrastructure |= update.infrastructure;

        let rename = update
            .name
            .filter(|c| c.source > record.name_source && c.name != record.display_name);
        if let Some(candidate) = rename {
            let name = unique_in(&records, &candidate.name, Some(id));
            if let Some(record) = records.get_mut(id) {
                debug!(id = %id, from = %record.display_name, to = %name, "renamed device");
                record.display_name = name;
                record.name_source = candidate.source;
            }
        }
        drop(records);
        self.mark_dirty();
        false
    }

    /// Mark a device as adopted by the user, seeding a record when the
    /// identity is not known yet. A title renames the record outright.
    /// Returns `true` when the record was created.
    pub fn mark_adopted(
        &self,
        id: &DeviceId,
        title: Option<&str>,
        ip: Option<Ipv4Addr>,
        now: DateTime<Utc>,
    ) -> bool {
        let title = title.map(str::trim).filter(|t| !t.is_empty());
        let mut records = self.lock();
        let is_new = !records.contains_key(id);

        if is_new {
            let (name, source) = match title {
                Some(t) => (t.to_owned(), NameSource::User),
                None => (fallback_name(id, ip), NameSource::Address),
            };
            let name = unique_in(&records, &name, None);
            let record = DeviceRecord::new(id.clone(), name, source, now);
            records.insert(id.clone(), record);
        } else if let Some(title) = title {
            let name = unique_in(&records, title, Some(id));
            if let Some(record) = records.get_mut(id) {
                record.display_name = name;
                record.name_source = NameSource::User;
            }
        }

        if let Some(record) = records.get_mut(id) {
            record.adopted = true;
            if ip.is_some() {
                record.ip = ip;
            }
        }
        drop(records);
        self.mark_dirty();
        is_new
    }

    /// A successful targeted probe. Returns `false` for unknown identities.
    pub fn mark_seen(&self, id: &DeviceId, now: DateTime<Utc>) -> bool {
        let found = self.with_record(id, |r| {
            r.last_seen = Some(r.last_seen.map_or(now, |prev| prev.max(now)));
            r.not_seen_since = None;
        });
        found.is_some()
    }

    /// A failed targeted probe; starts the failure run if none is open.
    /// Returns the start of the current run.
    pub fn record_probe_failure(&self, id: &DeviceId, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.with_record(id, |r| *r.not_seen_since.get_or_insert(now))
    }

    pub fn set_data_collection(&self, id: &DeviceId, enabled: bool) -> bool {
        self.with_record(id, |r| r.data_collection_enabled = enabled)
            .is_some()
    }

    pub fn set_mute_until(&self, id: &DeviceId, until: Option<DateTime<Utc>>) -> bool {
        self.with_record(id, |r| r.mute_until = until).is_some()
    }

    pub fn remove(&self, id: &DeviceId) -> Option<DeviceRecord> {
        let removed = self.lock().remove(id);
        if removed.is_some() {
            self.mark_dirty();
        }
        removed
    }

    /// Drop un-adopted records whose last sighting is older than `horizon`.
    /// Adopted records are never removed.
    pub fn prune(&self, now: DateTime<Utc>, horizon: Duration) -> Vec<DeviceRecord> {
        let mut records = self.lock();
        let stale: Vec<DeviceId> = records
            .values()
            .filter(|r| !r.adopted && now - r.last_sighting() > horizon)
            .map(|r| r.id.clone())
            .collect();
        let removed: Vec<DeviceRecord> = stale.iter().filter_map(|id| records.remove(id)).collect();
        drop(records);

        if !removed.is_empty() {
            debug!(count = removed.len(), "pruned stale candidates");
            self.mark_dirty();
        }
        removed
    }

    fn with_record<T>(&self, id: &DeviceId, f: impl FnOnce(&mut DeviceRecord) -> T) -> Option<T> {
        let result = self.lock().get_mut(id).map(f);
        if result.is_some() {
            self.mark_dirty();
        }
        result
    }
}

fn unique_in(records: &Records, candidate: &str, exclude: Option<&DeviceId>) -> String {
    deduplicate(candidate, |name| {
        records
            .values()
            .any(|r| Some(&r.id) != exclude && r.display_name == name)
    })
}

fn fallback_name(id: &DeviceId, ip: Option<Ipv4Addr>) -> String {
    match ip {
        Some(ip) => format!("{NAME_PREFIX}{ip}"),
        None => format!("{NAME_PREFIX}{id}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::NameCandidate;

    fn mac(last: u8) -> MacAddress {
        MacAddress::parse(&format!("aa:bb:cc:dd:ee:{last:02x}")).unwrap()
    }

    fn named(name: &str, source: NameSource) -> Option<NameCandidate> {
        Some(NameCandidate {
            name: name.into(),
            source,
        })
    }

    fn sighting(last: u8, name: &str, now: DateTime<Utc>) -> (DeviceId, DeviceUpdate) {
        let mac = mac(last);
        let id = DeviceId::from_mac(&mac);
        let update = DeviceUpdate {
            mac: Some(mac),
            ip: Some(Ipv4Addr::new(192, 168, 1, last)),
            name: named(name, NameSource::Vendor),
            seen_at: Some(now),
            infrastructure: false,
        };
        (id, update)
    }

    #[test]
    fn upsert_reports_new_identity_once() {
        let registry = Registry::new();
        let now = Utc::now();
        let (id, update) = sighting(1, "Presence - Apple", now);

        assert!(registry.upsert(&id, update.clone(), now));
        assert!(!registry.upsert(&id, update, now));
        assert_eq!(registry.len(), 1);
        assert!(registry.take_dirty());
        assert!(!registry.take_dirty());
    }

    #[test]
    fn ip_only_update_preserves_identity_fields() {
        let registry = Registry::new();
        let t0 = Utc::now() - Duration::minutes(5);
        let (id, update) = sighting(7, "Presence - Apple", t0);
        registry.upsert(&id, update, t0);

        let now = Utc::now();
        let ip_only = DeviceUpdate {
            ip: Some(Ipv4Addr::new(192, 168, 1, 77)),
            seen_at: Some(now),
            ..DeviceUpdate::default()
        };
        registry.upsert(&id, ip_only, now);

        let record = registry.get(&id).unwrap();
        assert_eq!(record.first_seen, t0);
        assert_eq!(record.mac, Some(mac(7)));
        assert_eq!(record.display_name, "Presence - Apple");
        assert_eq!(record.ip, Some(Ipv4Addr::new(192, 168, 1, 77)));
        assert_eq!(record.last_seen, Some(now));
    }

    #[test]
    fn last_seen_keeps_later_sighting_and_never_future() {
        let registry = Registry::new();
        let now = Utc::now();
        let (id, mut update) = sighting(2, "Presence - Apple", now);
        registry.upsert(&id, update.clone(), now);

        update.seen_at = Some(now - Duration::minutes(3));
        registry.upsert(&id, update.clone(), now);
        assert_eq!(registry.get(&id).unwrap().last_seen, Some(now));

        update.seen_at = Some(now + Duration::hours(1));
        registry.upsert(&id, update, now);
        assert_eq!(registry.get(&id).unwrap().last_seen, Some(now));
    }

    #[test]
    fn names_are_never_downgraded() {
        let registry = Registry::new();
        let now = Utc::now();
        let (id, mut update) = sighting(3, "Presence - kitchen", now);
        update.name = named("Presence - kitchen", NameSource::Neighbor);
        registry.upsert(&id, update.clone(), now);

        update.name = named("Presence - Apple", NameSource::Vendor);
        registry.upsert(&id, update.clone(), now);
        assert_eq!(registry.get(&id).unwrap().display_name, "Presence - kitchen");

        update.name = named("Presence - 192.168.1.3", NameSource::Address);
        registry.upsert(&id, update, now);
        assert_eq!(registry.get(&id).unwrap().display_name, "Presence - kitchen");
    }

    #[test]
    fn better_source_renames() {
        let registry = Registry::new();
        let now = Utc::now();
        let (id, mut update) = sighting(4, "Presence - 192.168.1.4", now);
        update.name = named("Presence - 192.168.1.4", NameSource::Address);
        registry.upsert(&id, update.clone(), now);

        update.name = named("Presence - Apple", NameSource::Vendor);
        registry.upsert(&id, update, now);
        let record = registry.get(&id).unwrap();
        assert_eq!(record.display_name, "Presence - Apple");
        assert_eq!(record.name_source, NameSource::Vendor);
    }

    #[test]
    fn colliding_names_get_smallest_suffix() {
        let registry = Registry::new();
        let now = Utc::now();
        for last in 1..=3 {
            let (id, update) = sighting(last, "Presence - Apple", now);
            registry.upsert(&id, update, now);
        }
        let mut names: Vec<String> = registry.snapshot().into_iter().map(|r| r.display_name).collect();
        names.sort();
        assert_eq!(
            names,
            vec!["Presence - Apple", "Presence - Apple 2", "Presence - Apple 3"]
        );

        // A record may keep its own name when re-resolved.
        let (id, _) = sighting(1, "", now);
        let own = registry.get(&id).unwrap().display_name;
        assert_eq!(registry.unique_name(&own, Some(&id)), own);
    }

    #[test]
    fn concurrent_upserts_never_share_a_name() {
        let registry = Arc::new(Registry::new());
        let now = Utc::now();
        let handles: Vec<_> = (1..=12u8)
            .map(|last| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let (id, update) = sighting(last, "Presence - Google", now);
                    registry.upsert(&id, update, now)
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }

        let names: HashSet<String> = registry.snapshot().into_iter().map(|r| r.display_name).collect();
        assert_eq!(names.len(), 12);
    }

    #[test]
    fn prune_spares_adopted_records() {
        let registry = Registry::new();
        let long_ago = Utc::now() - Duration::days(3);
        let now = Utc::now();

        let (stale, update) = sighting(10, "Presence - a", long_ago);
        registry.upsert(&stale, update, long_ago);
        let (kept, update) = sighting(11, "Presence - b", long_ago);
        registry.upsert(&kept, update, long_ago);
        registry.mark_adopted(&kept, None, None, long_ago);
        let (fresh, update) = sighting(12, "Presence - c", now);
        registry.upsert(&fresh, update, now);

        let removed = registry.prune(now, Duration::days(1));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, stale);
        assert!(registry.contains(&kept));
        assert!(registry.contains(&fresh));
    }

    #[test]
    fn mark_adopted_seeds_unknown_identity() {
        let registry = Registry::new();
        let now = Utc::now();
        let id = DeviceId::from("presence-seeded");

        assert!(registry.mark_adopted(&id, Some("Phone"), Some(Ipv4Addr::new(10, 0, 0, 9)), now));
        let record = registry.get(&id).unwrap();
        assert!(record.adopted);
        assert_eq!(record.display_name, "Phone");
        assert_eq!(record.name_source, NameSource::User);
        assert_eq!(record.mac, None);

        // A later scan fills the MAC but cannot override the user's title.
        let update = DeviceUpdate {
            mac: Some(mac(9)),
            name: named("Presence - Apple", NameSource::Vendor),
            ..DeviceUpdate::default()
        };
        registry.upsert(&id, update, now);
        let record = registry.get(&id).unwrap();
        assert_eq!(record.mac, Some(mac(9)));
        assert_eq!(record.display_name, "Phone");
    }

    #[test]
    fn failure_run_starts_once_and_clears_on_sighting() {
        let registry = Registry::new();
        let t0 = Utc::now();
        let (id, update) = sighting(5, "Presence - x", t0);
        registry.upsert(&id, update, t0);

        let later = t0 + Duration::minutes(2);
        assert_eq!(registry.record_probe_failure(&id, t0), Some(t0));
        assert_eq!(registry.record_probe_failure(&id, later), Some(t0));
        assert!(registry.mark_seen(&id, later));
        assert_eq!(registry.get(&id).unwrap().not_seen_since, None);
        assert_eq!(registry.record_probe_failure(&DeviceId::from("nope"), later), None);
    }

    #[test]
    fn restore_resets_liveness() {
        let now = Utc::now();
        let mut record = DeviceRecord::new(DeviceId::from("presence-1"), "Presence - a".into(), NameSource::Vendor, now);
        record.last_seen = Some(now);
        record.not_seen_since = Some(now);
        record.adopted = true;

        let registry = Registry::restore([record]);
        let restored = registry.get(&DeviceId::from("presence-1")).unwrap();
        assert_eq!(restored.last_seen, None);
        assert_eq!(restored.not_seen_since, None);
        assert!(restored.adopted);
        assert!(!registry.take_dirty());
    }
}
