// ── Host bridge ──
//
// The host platform renders devices as "things". Core only talks to it
// through `HostSink`; `HostBridge` remembers handles and the last value
// forwarded per property, so unchanged values are never re-sent.

use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use strum::{AsRefStr, Display, EnumIter};
use tracing::debug;

use crate::model::{DeviceId, DeviceRecord};

/// Opaque reference the host hands back for a registered thing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceHandle(pub String);

/// Properties each thing exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Property {
    RecentlySpotted,
    MinutesAgo,
    Details,
    DataCollection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Integer(i64),
    Text(String),
    Unknown,
}

impl From<Option<bool>> for PropertyValue {
    fn from(value: Option<bool>) -> Self {
        value.map_or(Self::Unknown, Self::Bool)
    }
}

impl From<Option<i64>> for PropertyValue {
    fn from(value: Option<i64>) -> Self {
        value.map_or(Self::Unknown, Self::Integer)
    }
}

/// Notification sink implemented by the host integration.
pub trait HostSink: Send + Sync {
    fn notify_new_device(&self, id: &DeviceId, display_name: &str, ip: Option<Ipv4Addr>) -> DeviceHandle;

    fn update_property(&self, handle: &DeviceHandle, property: Property, value: PropertyValue);

    fn notify_device_removed(&self, handle: &DeviceHandle);
}

/// Tracks registered things and de-duplicates property updates.
pub struct HostBridge {
    sink: Arc<dyn HostSink>,
    show_infrastructure: bool,
    handles: DashMap<DeviceId, DeviceHandle>,
    last_sent: DashMap<(DeviceId, Property), PropertyValue>,
}

impl HostBridge {
    pub fn new(sink: Arc<dyn HostSink>, show_infrastructure: bool) -> Self {
        Self {
            sink,
            show_infrastructure,
            handles: DashMap::new(),
            last_sent: DashMap::new(),
        }
    }

    pub fn is_registered(&self, id: &DeviceId) -> bool {
        self.handles.contains_key(id)
    }

    pub fn registered_count(&self) -> usize {
        self.handles.len()
    }

    /// Register a record with the host once. Infrastructure is skipped
    /// unless configured otherwise. Returns `true` on first registration.
    pub fn register(&self, record: &DeviceRecord) -> bool {
        if record.infrastructure && !self.show_infrastructure {
            return false;
        }
        if self.handles.contains_key(&record.id) {
            return false;
        }
        let handle = self
            .sink
            .notify_new_device(&record.id, &record.display_name, record.ip);
        debug!(id = %record.id, name = %record.display_name, "registered with host");
        self.handles.insert(record.id.clone(), handle);
        true
    }

    /// Forward every property of `record` whose value changed.
    pub fn publish(&self, record: &DeviceRecord, now: DateTime<Utc>, window: chrono::Duration) {
        let Some(handle) = self.handles.get(&record.id).map(|h| h.clone()) else {
            return;
        };
        let details = record
            .ip
            .map_or(PropertyValue::Unknown, |ip| PropertyValue::Text(ip.to_string()));
        let values: [(Property, PropertyValue); 4] = [
            (Property::RecentlySpotted, record.recently_spotted(now, window).into()),
            (Property::MinutesAgo, record.minutes_ago(now).into()),
            (Property::Details, details),
            (
                Property::DataCollection,
                PropertyValue::Bool(record.data_collection_enabled),
            ),
        ];
        for (property, value) in values {
            self.send(&record.id, &handle, property, value);
        }
    }

    /// Forward one value unless it equals the last one sent.
    pub fn send(&self, id: &DeviceId, handle: &DeviceHandle, property: Property, value: PropertyValue) {
        let key = (id.clone(), property);
        if self.last_sent.get(&key).is_some_and(|prev| *prev == value) {
            return;
        }
        self.sink.update_property(handle, property, value.clone());
        self.last_sent.insert(key, value);
    }

    /// Tell the host a device is gone and forget everything cached for it.
    pub fn remove(&self, id: &DeviceId) {
        if let Some((_, handle)) = self.handles.remove(id) {
            self.sink.notify_device_removed(&handle);
        }
        self.last_sent.retain(|(device, _), _| device != id);
    }

    /// Forget a pruned device without notifying the host.
    pub fn forget(&self, id: &DeviceId) {
        self.handles.remove(id);
        self.last_sent.retain(|(device, _), _| device != id);
    }
}
