//! `netpresence run`: the long-lived engine.

use std::sync::Arc;

use tracing::info;

use netpresence_config::Settings;
use netpresence_core::JsonFileStore;

use crate::cli::RunArgs;
use crate::error::CliError;

use super::util;

pub async fn handle(args: RunArgs, mut settings: Settings) -> Result<(), CliError> {
    if let Some(tick) = args.tick {
        settings.scan.tick_secs = tick.as_secs().max(1);
    }

    let store = Arc::new(JsonFileStore::new(settings.registry_path()));
    info!(registry = %store.path().display(), "using registry");
    let engine = util::build_engine(&settings, store, !args.no_name_sweep)?;

    engine.start().await;
    if args.pair {
        engine.start_pairing().await;
    }

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    engine.shutdown().await?;
    Ok(())
}
