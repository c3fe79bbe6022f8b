//! Clap derive structures for the `netpresence` CLI.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// netpresence -- discover and track devices on the local network
#[derive(Debug, Parser)]
#[command(
    name = "netpresence",
    version,
    about = "Discover and track devices on the local network",
    long_about = "Probes the local /24 with ping and ARP tooling, keeps one record per\n\
        physical device keyed by MAC address, and reports whether each adopted\n\
        device was recently spotted.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "NETPRESENCE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "NETPRESENCE_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the presence engine until interrupted
    Run(RunArgs),

    /// One-shot scan of the local network
    Scan(ScanArgs),

    /// Inspect the persisted device registry
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  RUN / SCAN
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Scan everything right away, as when the host asks for pairing
    #[arg(long)]
    pub pair: bool,

    /// Override the clock period (e.g. "30s", "2m")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub tick: Option<Duration>,

    /// Skip the mDNS / NetBIOS name sweep
    #[arg(long)]
    pub no_name_sweep: bool,
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Also probe every address in the /24
    #[arg(long, short = 'b')]
    pub brute_force: bool,

    /// Run the mDNS / NetBIOS name sweep first
    #[arg(long, short = 'n')]
    pub names: bool,

    /// Merge results into the persisted registry
    #[arg(long)]
    pub save: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  DEVICES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Edits go straight to the registry file; a running `netpresence run`
/// picks them up on its next start and overwrites them when it saves.
#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: Option<DevicesCommand>,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List known devices (default)
    #[command(alias = "ls")]
    List {
        /// Only devices adopted on the host
        #[arg(long, short = 'a')]
        adopted: bool,

        /// Include gateway/controller infrastructure
        #[arg(long)]
        all: bool,
    },

    /// Show one device
    Get {
        /// Device ID or MAC address
        device: String,
    },

    /// Forget a device
    Remove {
        /// Device ID or MAC address
        device: String,
    },

    /// Adopt a device so it is re-checked on every tick
    Adopt {
        /// Device ID or MAC address (an unknown MAC is seeded)
        device: String,

        /// Display name for the device
        #[arg(long)]
        name: Option<String>,

        /// Last known IPv4 address
        #[arg(long)]
        ip: Option<Ipv4Addr>,
    },

    /// Stop probing a device for a while ("0s" lifts the mute)
    Mute {
        /// Device ID or MAC address
        device: String,

        /// How long, e.g. "30m", "2h"
        #[arg(value_parser = humantime::parse_duration)]
        duration: Duration,
    },

    /// Turn active probing of a device on or off
    Collect {
        /// Device ID or MAC address
        device: String,

        /// on / off
        #[arg(action = ArgAction::Set, value_parser = BoolishValueParser::new())]
        enabled: bool,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG / COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Display the resolved configuration
    Show,

    /// Print the config file path
    Path,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
