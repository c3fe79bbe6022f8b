//! Device command handlers. These read and edit the persisted registry
//! directly and never probe the network.

use chrono::Utc;

use netpresence_config::Settings;
use netpresence_core::{
    DeviceId, DeviceRecord, JsonFileStore, MacAddress, Registry, RegistryStore, mute_deadline,
};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util::{self, DeviceRow};

fn detail(record: &DeviceRecord) -> String {
    let now = Utc::now();
    let lines = [
        format!("ID:          {}", record.id),
        format!("Name:        {}", record.display_name),
        format!("Name source: {}", record.name_source),
        format!(
            "MAC:         {}",
            record.mac.as_ref().map_or_else(|| "-".into(), ToString::to_string)
        ),
        format!(
            "IP:          {}",
            record.ip.map_or_else(|| "-".into(), |ip| ip.to_string())
        ),
        format!("First seen:  {}", record.first_seen.to_rfc3339()),
        format!("Last seen:   {}", util::ago(record.last_seen, now)),
        format!("Adopted:     {}", record.adopted),
        format!("Collecting:  {}", record.data_collection_enabled),
        format!(
            "Muted until: {}",
            record
                .mute_until
                .filter(|until| *until > now)
                .map_or_else(|| "-".into(), |until| until.to_rfc3339())
        ),
        format!("Infra:       {}", record.infrastructure),
    ];
    lines.join("\n")
}

/// Identity to adopt: a known device, or the identity a not yet seen MAC
/// will have once a scan finds it.
fn adoption_id(records: &[DeviceRecord], device: &str) -> Result<DeviceId, CliError> {
    match util::find_device(records, device) {
        Ok(record) => Ok(record.id.clone()),
        Err(e) if DeviceId::is_presence_id(device) => Err(e),
        Err(_) => Ok(DeviceId::from_mac(&MacAddress::parse(device)?)),
    }
}

fn save(store: &JsonFileStore, registry: &Registry) -> Result<(), CliError> {
    store.save(&registry.to_snapshot())?;
    Ok(())
}

pub fn handle(args: DevicesArgs, settings: &Settings, global: &GlobalOpts) -> Result<(), CliError> {
    let store = JsonFileStore::new(settings.registry_path());
    let registry = Registry::load_from(&store);
    let records = registry.snapshot();

    match args.command.unwrap_or(DevicesCommand::List {
        adopted: false,
        all: false,
    }) {
        DevicesCommand::List { adopted, all } => {
            let now = Utc::now();
            let window = settings.to_presence_config()?.time_window_chrono();
            let color = output::should_color(&global.color);
            let shown: Vec<DeviceRecord> = records
                .into_iter()
                .filter(|r| !adopted || r.adopted)
                .filter(|r| all || !r.infrastructure)
                .collect();
            let out = output::render_list(
                &global.output,
                &shown,
                |r| DeviceRow::new(r, now, window, color),
                |r| r.id.to_string(),
            )?;
            output::print_output(&out, global.quiet);
        }

        DevicesCommand::Get { device } => {
            let record = util::find_device(&records, &device)?;
            let out = output::render_single(
                &global.output,
                record,
                |r| Ok(detail(r)),
                |r| r.id.to_string(),
            )?;
            output::print_output(&out, global.quiet);
        }

        DevicesCommand::Remove { device } => {
            let id = util::find_device(&records, &device)?.id.clone();
            if let Some(removed) = registry.remove(&id) {
                save(&store, &registry)?;
                if !global.quiet {
                    eprintln!("Removed {} ({})", removed.display_name, removed.id);
                }
            }
        }

        DevicesCommand::Adopt { device, name, ip } => {
            let id = adoption_id(&records, &device)?;
            let seeded = registry.mark_adopted(&id, name.as_deref(), ip, Utc::now());
            save(&store, &registry)?;
            if !global.quiet {
                let name = registry
                    .get(&id)
                    .map_or_else(|| id.to_string(), |r| r.display_name);
                let how = if seeded { "Seeded and adopted" } else { "Adopted" };
                eprintln!("{how} {name} ({id})");
            }
        }

        DevicesCommand::Mute { device, duration } => {
            let id = util::find_device(&records, &device)?.id.clone();
            let until = mute_deadline(Utc::now(), duration);
            registry.set_mute_until(&id, until);
            save(&store, &registry)?;
            if !global.quiet {
                match until {
                    Some(until) => eprintln!("Muted {id} until {}", until.to_rfc3339()),
                    None => eprintln!("Unmuted {id}"),
                }
            }
        }

        DevicesCommand::Collect { device, enabled } => {
            let id = util::find_device(&records, &device)?.id.clone();
            registry.set_data_collection(&id, enabled);
            save(&store, &registry)?;
            if !global.quiet {
                let state = if enabled { "on" } else { "off" };
                eprintln!("Data collection {state} for {id}");
            }
        }
    }
    Ok(())
}
