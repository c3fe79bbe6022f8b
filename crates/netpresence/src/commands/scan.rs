//! `netpresence scan`: one pass of the scan strategies, then print.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use netpresence_config::Settings;
use netpresence_core::{JsonFileStore, MemoryStore, RegistryStore};

use crate::cli::{GlobalOpts, ScanArgs};
use crate::error::CliError;
use crate::output;

use super::util::{self, DeviceRow};

pub async fn handle(args: ScanArgs, settings: &Settings, global: &GlobalOpts) -> Result<(), CliError> {
    let store: Arc<dyn RegistryStore> = if args.save {
        Arc::new(JsonFileStore::new(settings.registry_path()))
    } else {
        Arc::new(MemoryStore::new())
    };
    let engine = util::build_engine(settings, store, args.names)?;

    if args.names {
        if let Some(report) = engine.run_name_sweep().await {
            info!(names = report.names, "name sweep done");
        }
    }
    if let Some(report) = engine.run_neighbor_scan().await {
        info!(entries = report.entries, new = report.new_devices.len(), "neighbor scan done");
    }
    if args.brute_force {
        if let Some(report) = engine.run_brute_force_scan().await {
            info!(alive = report.alive.len(), new = report.new_devices.len(), "brute-force scan done");
        }
    }
    if args.save {
        engine.save_now()?;
    }

    let now = Utc::now();
    let window = engine.config().time_window_chrono();
    let color = output::should_color(&global.color);
    let devices = engine.devices();
    let out = output::render_list(
        &global.output,
        &devices,
        |r| DeviceRow::new(r, now, window, color),
        |r| r.id.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
