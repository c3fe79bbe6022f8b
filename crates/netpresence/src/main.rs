mod cli;
mod commands;
mod error;
mod host;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use netpresence_config::{ConfigError, Settings};

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Loaded up front so `debug = true` can raise the log level
    let settings = netpresence_config::load_config(cli.global.config.as_deref());
    let debug = settings.as_ref().is_ok_and(|s| s.debug);
    let baseline = u8::from(matches!(cli.command, Command::Run(_)));
    init_tracing(baseline.saturating_add(cli.global.verbose), cli.global.quiet, debug);

    if let Err(err) = run(cli, settings).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, quiet: bool, debug: bool) {
    let filter = match verbosity {
        _ if quiet => "error",
        0 | 1 if debug => "debug",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli, settings: Result<Settings, ConfigError>) -> Result<(), CliError> {
    match cli.command {
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "netpresence", &mut std::io::stdout());
            Ok(())
        }

        // Config commands must work even when the file does not parse
        Command::Config(args) => commands::config_cmd::handle(args, settings, &cli.global),

        Command::Run(args) => commands::run::handle(args, settings?).await,

        Command::Scan(args) => commands::scan::handle(args, &settings?, &cli.global).await,

        Command::Devices(args) => commands::devices::handle(args, &settings?, &cli.global),
    }
}
