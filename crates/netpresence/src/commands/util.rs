//! Shared helpers for command handlers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tabled::Tabled;

use netpresence_config::Settings;
use netpresence_core::{
    AvahiBrowse, Collaborators, DeviceRecord, Engine, LocalNetwork, NameDiscovery, NbtScan,
    OuiTable, RegistryStore, SystemProber, normalize_mac,
};

use crate::error::CliError;
use crate::host::TracingHost;
use crate::output;

// ── Engine assembly ─────────────────────────────────────────────────

/// Resolve the local network and wire the command-backed collaborators.
pub fn build_engine(
    settings: &Settings,
    store: Arc<dyn RegistryStore>,
    with_name_sweep: bool,
) -> Result<Engine, CliError> {
    let config = settings.to_presence_config()?;
    let network = LocalNetwork::resolve(&config)?;
    let prober = Arc::new(SystemProber::new(settings.prober_options(&network.interface)));
    let vendors = OuiTable::load(&settings.oui_path());

    let name_sources: Vec<Arc<dyn NameDiscovery>> = if with_name_sweep {
        vec![
            Arc::new(AvahiBrowse::new(
                Arc::clone(&prober),
                config.infrastructure_markers.clone(),
            )),
            Arc::new(NbtScan::new(Arc::clone(&prober), network.subnet)),
        ]
    } else {
        Vec::new()
    };

    Ok(Engine::new(
        config,
        network,
        Collaborators {
            prober,
            host: Arc::new(TracingHost),
            store,
            vendors: Arc::new(vendors),
            name_sources,
        },
    ))
}

// ── Device lookup ───────────────────────────────────────────────────

/// Find a record by identity or MAC address.
pub fn find_device<'a>(
    records: &'a [DeviceRecord],
    identifier: &str,
) -> Result<&'a DeviceRecord, CliError> {
    let mac = normalize_mac(identifier);
    records
        .iter()
        .find(|r| {
            r.id.as_str() == identifier
                || mac
                    .as_deref()
                    .is_some_and(|m| r.mac.as_ref().is_some_and(|own| own.as_str() == m))
        })
        .ok_or_else(|| CliError::NotFound {
            identifier: identifier.into(),
        })
}

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
pub struct DeviceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "Adopted")]
    adopted: String,
    #[tabled(rename = "Spotted")]
    spotted: String,
    #[tabled(rename = "Last seen")]
    last_seen: String,
    #[tabled(rename = "ID")]
    id: String,
}

impl DeviceRow {
    pub fn new(
        record: &DeviceRecord,
        now: DateTime<Utc>,
        window: chrono::Duration,
        color: bool,
    ) -> Self {
        Self {
            name: record.display_name.clone(),
            ip: record.ip.map(|ip| ip.to_string()).unwrap_or_default(),
            mac: record.mac.as_ref().map(ToString::to_string).unwrap_or_default(),
            adopted: if record.adopted { "yes".into() } else { String::new() },
            spotted: output::spotted_label(record.recently_spotted(now, window), color),
            last_seen: ago(record.last_seen, now),
            id: record.id.to_string(),
        }
    }
}

/// "3m 12s ago", or "-" when never seen this run.
pub fn ago(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = at else {
        return "-".into();
    };
    let secs = (now - at).num_seconds().max(0).unsigned_abs();
    format!("{} ago", humantime::format_duration(Duration::from_secs(secs)))
}
