// ── Registry persistence ──
//
// The whole registry is one JSON document, rewritten on every flush.
// Writes go to a sibling temp file first and are renamed into place.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoreError;
use crate::model::{DeviceId, DeviceRecord};

/// Bumped whenever `DeviceRecord` changes incompatibly.
pub const SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub schema_version: u32,
    pub devices: BTreeMap<DeviceId, DeviceRecord>,
}

impl RegistrySnapshot {
    pub fn new(devices: BTreeMap<DeviceId, DeviceRecord>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            devices,
        }
    }
}

/// Load/save of the whole registry blob.
pub trait RegistryStore: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<RegistrySnapshot>, CoreError>;

    fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), CoreError>;
}

// ── JSON file ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl RegistryStore for JsonFileStore {
    fn load(&self) -> Result<Option<RegistrySnapshot>, CoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CoreError::RegistryRead {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let snapshot: RegistrySnapshot =
            serde_json::from_str(&text).map_err(|e| CoreError::CorruptRegistry {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        if snapshot.schema_version != SCHEMA_VERSION {
            return Err(CoreError::SchemaMismatch {
                found: snapshot.schema_version,
                expected: SCHEMA_VERSION,
            });
        }
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), CoreError> {
        let write_err = |source| CoreError::RegistryWrite {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.temp_path();
        std::fs::write(&tmp, json).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)?;

        debug!(path = %self.path.display(), devices = snapshot.devices.len(), "saved registry");
        Ok(())
    }
}

// ── In-memory ────────────────────────────────────────────────────────

/// Store that keeps the last saved snapshot in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<Option<RegistrySnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: RegistrySnapshot) -> Self {
        Self {
            saved: Mutex::new(Some(snapshot)),
        }
    }

    pub fn last_saved(&self) -> Option<RegistrySnapshot> {
        self.saved
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl RegistryStore for MemoryStore {
    fn load(&self) -> Result<Option<RegistrySnapshot>, CoreError> {
        Ok(self.last_saved())
    }

    fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), CoreError> {
        *self
            .saved
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{DeviceUpdate, MacAddress, NameCandidate, NameSource};
    use crate::store::Registry;

    fn populated() -> Registry {
        let registry = Registry::new();
        let now = Utc::now();
        for last in 1..=2u8 {
            let mac = MacAddress::parse(&format!("00:1a:11:00:00:{last:02x}")).unwrap();
            let id = DeviceId::from_mac(&mac);
            let update = DeviceUpdate {
                mac: Some(mac),
                ip: Some(std::net::Ipv4Addr::new(192, 168, 1, last)),
                name: Some(NameCandidate {
                    name: "Presence - Google".into(),
                    source: NameSource::Vendor,
                }),
                seen_at: Some(now),
                infrastructure: false,
            };
            registry.upsert(&id, update, now);
        }
        let first = registry.snapshot()[0].id.clone();
        registry.mark_adopted(&first, None, None, now);
        registry
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("devices.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn restart_resets_last_seen_and_keeps_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("devices.json"));
        let before = populated();
        store.save(&before.to_snapshot()).unwrap();

        let after = Registry::load_from(&store);
        assert_eq!(after.len(), 2);
        for old in before.snapshot() {
            let new = after.get(&old.id).unwrap();
            assert!(old.last_seen.is_some());
            assert_eq!(new.last_seen, None);
            assert_eq!(new.mac, old.mac);
            assert_eq!(new.display_name, old.display_name);
            assert_eq!(new.first_seen, old.first_seen);
            assert_eq!(new.adopted, old.adopted);
        }
        assert!(!dir.path().join("nested").join("devices.json.tmp").exists());
    }

    #[test]
    fn corrupt_file_resets_to_empty_and_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = JsonFileStore::new(&path);

        assert!(matches!(store.load(), Err(CoreError::CorruptRegistry { .. })));
        let registry = Registry::load_from(&store);
        assert!(registry.is_empty());
        assert!(registry.take_dirty());
    }

    #[test]
    fn other_schema_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        std::fs::write(&path, r#"{"schema_version": 1, "devices": {}}"#).unwrap();
        let store = JsonFileStore::new(&path);

        assert!(matches!(
            store.load(),
            Err(CoreError::SchemaMismatch { found: 1, expected: SCHEMA_VERSION })
        ));
        assert!(Registry::load_from(&store).is_empty());
    }

    #[test]
    fn saved_document_is_keyed_by_identity() {
        let registry = populated();
        let json = serde_json::to_value(registry.to_snapshot()).unwrap();
        assert_eq!(json["schema_version"], 2);
        let devices = json["devices"].as_object().unwrap();
        assert!(devices.keys().all(|k| k.starts_with("presence-")));
    }
}
