// ── Command-backed prober ──
//
// Shells out to the standard Linux tools. Each invocation is bounded by a
// timeout and killed on drop. A tool that is missing or reports an
// environment error (permissions, unknown interface) degrades that probe
// kind to a permanent "no answer" with a single warning.

use std::net::Ipv4Addr;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashSet;
use strum::{AsRefStr, Display};
use tokio::process::Command;
use tracing::{debug, trace, warn};

use super::parse::{parse_arp_output, parse_neighbor_output};
use super::{ArpEntry, NeighborEntry, Prober};

/// External tools the engine depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ProbeTool {
    Ping,
    Arping,
    Arp,
    Ip,
    AvahiBrowse,
    Nbtscan,
}

/// Knobs for [`SystemProber`].
#[derive(Debug, Clone)]
pub struct SystemProberOptions {
    pub interface: String,
    /// Prefix arping with `sudo -n` (arping usually needs raw sockets).
    pub use_sudo_for_arping: bool,
    /// Per-attempt timeout.
    pub probe_timeout: Duration,
}

impl Default for SystemProberOptions {
    fn default() -> Self {
        Self {
            interface: "eth0".into(),
            use_sudo_for_arping: false,
            probe_timeout: Duration::from_secs(1),
        }
    }
}

/// Grace on top of the per-attempt budget before a command is abandoned.
const COMMAND_SLACK: Duration = Duration::from_secs(2);

/// Lower-cased stderr fragments that mean the tool cannot work here at all.
const FATAL_STDERR: &[&str] = &[
    "operation not permitted",
    "permission denied",
    "password is required",
    "unknown iface",
    "no such device",
    "cannot find device",
    "daemon not running",
];

/// Why a finished run counts as a tool failure rather than "no reply".
///
/// `ping` and `arping` exit 1 when nothing answered and 2 or more on
/// errors; any tool whose stderr carries a fatal fragment also fails.
pub fn tool_failure(exit_code: Option<i32>, stderr: &str) -> Option<String> {
    let stderr = stderr.trim();
    let lowered = stderr.to_lowercase();
    if FATAL_STDERR.iter().any(|fragment| lowered.contains(fragment)) {
        return Some(stderr.lines().next().unwrap_or_default().to_owned());
    }
    match exit_code {
        Some(code) if code >= 2 => Some(if stderr.is_empty() {
            format!("exit status {code}")
        } else {
            stderr.lines().next().unwrap_or_default().to_owned()
        }),
        _ => None,
    }
}

#[derive(Debug)]
pub struct SystemProber {
    options: SystemProberOptions,
    degraded: DashSet<ProbeTool>,
}

impl SystemProber {
    pub fn new(options: SystemProberOptions) -> Self {
        Self {
            options,
            degraded: DashSet::new(),
        }
    }

    pub fn interface(&self) -> &str {
        &self.options.interface
    }

    /// Tools that failed to launch or reported an environment error and
    /// are now skipped.
    pub fn degraded_tools(&self) -> Vec<ProbeTool> {
        self.degraded.iter().map(|t| *t).collect()
    }

    /// Run a tool to completion within `budget`.
    ///
    /// Returns `None` when the tool is degraded, fails to launch, reports an
    /// environment error (see [`tool_failure`]), or times out. Any other
    /// non-zero exit status is returned as-is: for `ping`/`arping` it just
    /// means "no reply".
    pub async fn run(&self, tool: ProbeTool, args: &[&str], budget: Duration) -> Option<Output> {
        if self.degraded.contains(&tool) {
            return None;
        }

        let (program, args) = if tool == ProbeTool::Arping && self.options.use_sudo_for_arping {
            let mut full = vec!["-n", tool.as_ref()];
            full.extend_from_slice(args);
            ("sudo", full)
        } else {
            (tool.as_ref(), args.to_vec())
        };

        trace!(program, ?args, "spawning probe");
        let mut command = Command::new(program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(budget, command.output()).await {
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                match tool_failure(output.status.code(), &stderr) {
                    Some(reason) => {
                        self.degrade(tool, &reason);
                        None
                    }
                    None => Some(output),
                }
            }
            Ok(Err(e)) => {
                self.degrade(tool, &e.to_string());
                None
            }
            Err(_) => {
                debug!(tool = %tool, ?budget, "probe timed out");
                None
            }
        }
    }

    fn degrade(&self, tool: ProbeTool, reason: &str) {
        if self.degraded.insert(tool) {
            warn!(tool = %tool, reason, "probe tool failing, disabling it");
        }
    }

    fn budget_for(&self, attempts: u32) -> Duration {
        self.options.probe_timeout * attempts.max(1) + COMMAND_SLACK
    }

    async fn run_stdout(&self, tool: ProbeTool, args: &[&str]) -> Option<String> {
        self.run(tool, args, self.budget_for(1))
            .await
            .map(|output| String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Prober for SystemProber {
    async fn ping(&self, ip: Ipv4Addr, attempts: u32) -> bool {
        let ip = ip.to_string();
        let count = attempts.max(1).to_string();
        let wait = self.options.probe_timeout.as_secs().max(1).to_string();
        let args = [
            "-I",
            self.interface(),
            "-c",
            count.as_str(),
            "-i",
            "0.5",
            "-W",
            wait.as_str(),
            ip.as_str(),
        ];
        self.run(ProbeTool::Ping, &args, self.budget_for(attempts))
            .await
            .is_some_and(|output| output.status.success())
    }

    async fn arp_request(&self, ip: Ipv4Addr, attempts: u32) -> bool {
        let ip = ip.to_string();
        let count = attempts.max(1).to_string();
        let args = ["-i", self.interface(), "-c", count.as_str(), ip.as_str()];
        self.run(ProbeTool::Arping, &args, self.budget_for(attempts))
            .await
            .is_some_and(|output| output.status.success())
    }

    async fn arp_cache_entry(&self, ip: Ipv4Addr) -> Option<ArpEntry> {
        let target = ip.to_string();
        let stdout = self
            .run_stdout(ProbeTool::Arp, &["-n", "-i", self.interface(), target.as_str()])
            .await?;
        parse_arp_output(&stdout).into_iter().find(|e| e.ip == ip)
    }

    async fn dump_arp_cache(&self) -> Vec<ArpEntry> {
        self.run_stdout(ProbeTool::Arp, &["-a"])
            .await
            .map(|stdout| parse_arp_output(&stdout))
            .unwrap_or_default()
    }

    async fn neighbor_table(&self) -> Vec<NeighborEntry> {
        self.run_stdout(ProbeTool::Ip, &["neighbor", "show"])
            .await
            .map(|stdout| parse_neighbor_output(&stdout))
            .unwrap_or_default()
    }
}
