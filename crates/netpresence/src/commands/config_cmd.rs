//! Config subcommand handlers.

use std::path::PathBuf;

use netpresence_config::{self as config, ConfigError, Settings};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

fn resolved_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config::config_path)
}

pub fn handle(
    args: ConfigArgs,
    settings: Result<Settings, ConfigError>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let path = resolved_path(global);

    match args.command {
        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
        }

        ConfigCommand::Init { force } => {
            let written = if force {
                config::save_config(&Settings::default(), &path)?;
                true
            } else {
                config::init_config(&path)?
            };
            if !global.quiet {
                if written {
                    eprintln!("Wrote default configuration to {}", path.display());
                } else {
                    eprintln!(
                        "{} already exists (use --force to overwrite)",
                        path.display()
                    );
                }
            }
        }

        ConfigCommand::Show => {
            let settings = settings?;
            let out = output::render_single(
                &global.output,
                &settings,
                |s| Ok(toml::to_string_pretty(s)?),
                |_| path.display().to_string(),
            )?;
            output::print_output(&out, global.quiet);
        }
    }
    Ok(())
}
