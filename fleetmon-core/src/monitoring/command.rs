//! The fixed set of remote commands
//!
//! Remote execution is limited to these kinds. Every command string is a
//! compile-time constant; nothing sent to a remote shell is ever built from
//! host names, user input, or remote output.

use serde::{Deserialize, Serialize};

/// Marker echoed back by the liveness command
pub const LIVENESS_MARKER: &str = "fleetmon-alive";

const ECHO_COMMAND: &str = "echo fleetmon-alive";

/// Two `/proc/stat` readings half a second apart, so one invocation yields
/// a CPU delta without per-host state between ticks.
const CPU_COMMAND: &str = "head -1 /proc/stat; sleep 0.5; head -1 /proc/stat";

const MEMORY_COMMAND: &str =
    "grep -E '^(MemTotal|MemAvailable|MemFree|Buffers|Cached|SwapTotal|SwapFree):' /proc/meminfo";

const DISK_COMMAND: &str = "df -Pk / 2>/dev/null | tail -1";

const NETWORK_COMMAND: &str = "tail -n +3 /proc/net/dev";

const LOAD_COMMAND: &str = "cat /proc/loadavg";

const PROCESSES_COMMAND: &str = "ps -eo pcpu=,pmem=,comm= --sort=-pcpu 2>/dev/null";

/// Static system information, run once after connecting.
const SYSTEM_INFO_COMMAND: &str = concat!(
    "echo '---FLEETMON_HOSTNAME---';",
    "uname -n;",
    "echo '---FLEETMON_UNAME---';",
    "uname -r;",
    "echo '---FLEETMON_OSRELEASE---';",
    "cat /etc/os-release 2>/dev/null;",
    "echo '---FLEETMON_UPTIME---';",
    "cat /proc/uptime;",
    "echo '---FLEETMON_HWINFO---';",
    "grep '^MemTotal:' /proc/meminfo;",
    "echo 'CPUTHREADS='$(grep -c '^processor' /proc/cpuinfo);",
    "echo 'CPUCORES='$(grep '^cpu cores' /proc/cpuinfo | head -1 | awk '{print $NF}');",
    "echo 'ARCH='$(uname -m);",
    "echo '---FLEETMON_SYSINFO_END---'",
);

/// A remote command the collector or session manager may run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Trivial liveness check
    Echo,
    /// Hostname, kernel, distro, uptime, cores, arch
    SystemInfo,
    /// Aggregate CPU counters
    Cpu,
    /// `/proc/meminfo`
    Memory,
    /// Root filesystem usage
    Disk,
    /// Interface byte counters
    Network,
    /// Load average
    Load,
    /// Process table sorted by CPU
    Processes,
}

impl CommandKind {
    /// Commands issued by one metrics collection, in order
    pub const METRICS_BATCH: [Self; 6] = [
        Self::Cpu,
        Self::Memory,
        Self::Disk,
        Self::Network,
        Self::Load,
        Self::Processes,
    ];

    /// Returns the shell command for this kind
    #[must_use]
    pub const fn command(self) -> &'static str {
        match self {
            Self::Echo => ECHO_COMMAND,
            Self::SystemInfo => SYSTEM_INFO_COMMAND,
            Self::Cpu => CPU_COMMAND,
            Self::Memory => MEMORY_COMMAND,
            Self::Disk => DISK_COMMAND,
            Self::Network => NETWORK_COMMAND,
            Self::Load => LOAD_COMMAND,
            Self::Processes => PROCESSES_COMMAND,
        }
    }

    /// Short identifier for logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Echo => "echo",
            Self::SystemInfo => "system_info",
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::Disk => "disk",
            Self::Network => "network",
            Self::Load => "load",
            Self::Processes => "processes",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
