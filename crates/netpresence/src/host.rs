//! Log-backed host for standalone runs: every thing registration, property
//! change, and removal becomes a tracing event.

use std::net::Ipv4Addr;

use tracing::{debug, info};

use netpresence_core::{DeviceHandle, DeviceId, HostSink, Property, PropertyValue};

#[derive(Debug, Default)]
pub struct TracingHost;

impl HostSink for TracingHost {
    fn notify_new_device(&self, id: &DeviceId, display_name: &str, ip: Option<Ipv4Addr>) -> DeviceHandle {
        info!(%id, name = display_name, ip = ?ip, "new device");
        DeviceHandle(id.to_string())
    }

    fn update_property(&self, handle: &DeviceHandle, property: Property, value: PropertyValue) {
        match property {
            Property::RecentlySpotted => info!(device = %handle.0, ?value, "{property}"),
            _ => debug!(device = %handle.0, ?value, "{property}"),
        }
    }

    fn notify_device_removed(&self, handle: &DeviceHandle) {
        info!(device = %handle.0, "device removed");
    }
}
