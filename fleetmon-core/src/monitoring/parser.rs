//! Typed parsers for remote command output
//!
//! One parser per [`CommandKind`]. Parsers accept extra whitespace, extra
//! trailing fields, and missing optional fields, but return
//! [`MonitoringError::ParseError`] on output they do not recognise instead
//! of guessing zeros.

use super::command::{CommandKind, LIVENESS_MARKER};
use super::metrics::{
    CpuSnapshot, DiskMetrics, LoadAverage, MemoryMetrics, NetworkCounters, ProcessEntry,
    ProcessList, SystemInfo,
};

/// Default number of processes kept in a sample
pub const DEFAULT_TOP_PROCESSES: usize = 5;

/// Errors that can occur during metrics parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MonitoringError {
    /// The remote output could not be parsed
    #[error("Failed to parse {kind} output: {reason}")]
    ParseError {
        /// Command whose output was rejected
        kind: CommandKind,
        /// What was wrong with it
        reason: String,
    },
}

impl MonitoringError {
    fn parse(kind: CommandKind, reason: impl Into<String>) -> Self {
        Self::ParseError {
            kind,
            reason: reason.into(),
        }
    }
}

/// Result type for monitoring operations
pub type MonitoringResult<T> = Result<T, MonitoringError>;

/// Parsed output of one command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    /// Liveness marker received
    Alive,
    /// Static host facts
    SystemInfo(SystemInfo),
    /// CPU usage percentage over the sampling window
    Cpu(f32),
    /// Memory usage
    Memory(MemoryMetrics),
    /// Root filesystem usage
    Disk(DiskMetrics),
    /// Interface counters
    Network(NetworkCounters),
    /// Load average
    Load(LoadAverage),
    /// Process table
    Processes(ProcessList),
}

/// Stateless parser for remote metrics output
#[derive(Debug, Clone, Copy)]
pub struct MetricsParser {
    top_processes: usize,
}

impl Default for MetricsParser {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_PROCESSES)
    }
}

impl MetricsParser {
    /// Creates a parser keeping `top_processes` process entries
    #[must_use]
    pub const fn new(top_processes: usize) -> Self {
        Self { top_processes }
    }

    /// Parses the output of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`MonitoringError::ParseError`] if the output is not in the
    /// shape the command produces.
    pub fn parse(&self, kind: CommandKind, output: &str) -> MonitoringResult<CommandOutput> {
        match kind {
            CommandKind::Echo => Self::parse_echo(output).map(|()| CommandOutput::Alive),
            CommandKind::SystemInfo => Self::parse_system_info(output).map(CommandOutput::SystemInfo),
            CommandKind::Cpu => Self::parse_cpu(output).map(CommandOutput::Cpu),
            CommandKind::Memory => Self::parse_meminfo(output).map(CommandOutput::Memory),
            CommandKind::Disk => Self::parse_df(output).map(CommandOutput::Disk),
            CommandKind::Network => Self::parse_net_dev(output).map(CommandOutput::Network),
            CommandKind::Load => Self::parse_loadavg(output).map(CommandOutput::Load),
            CommandKind::Processes => self.parse_processes(output).map(CommandOutput::Processes),
        }
    }

    fn parse_echo(output: &str) -> MonitoringResult<()> {
        if output.lines().any(|l| l.trim() == LIVENESS_MARKER) {
            Ok(())
        } else {
            Err(MonitoringError::parse(
                CommandKind::Echo,
                "liveness marker missing",
            ))
        }
    }

    /// Parses two aggregate `cpu` lines of `/proc/stat` into a usage percentage.
    ///
    /// Format: `cpu  user nice system idle iowait irq softirq steal ...`.
    /// Kernels before 2.6.11 report only the first four counters.
    pub fn parse_cpu(output: &str) -> MonitoringResult<f32> {
        let snapshots = output
            .lines()
            .map(str::trim)
            .filter(|l| l.starts_with("cpu ") || l.starts_with("cpu\t"))
            .map(Self::parse_cpu_line)
            .collect::<MonitoringResult<Vec<_>>>()?;

        match snapshots.as_slice() {
            [first, .., last] => Ok(last.cpu_percent_since(first)),
            [_] => Err(MonitoringError::parse(
                CommandKind::Cpu,
                "only one cpu reading, need two for a delta",
            )),
            [] => Err(MonitoringError::parse(
                CommandKind::Cpu,
                "no aggregate cpu line",
            )),
        }
    }

    fn parse_cpu_line(line: &str) -> MonitoringResult<CpuSnapshot> {
        let values = line
            .split_whitespace()
            .skip(1)
            .map(str::parse::<u64>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| MonitoringError::parse(CommandKind::Cpu, format!("bad counter: {e}")))?;

        if values.len() < 4 {
            return Err(MonitoringError::parse(
                CommandKind::Cpu,
                "too few fields in cpu line",
            ));
        }

        let v = |i: usize| values.get(i).copied().unwrap_or(0);
        Ok(CpuSnapshot {
            user: v(0),
            nice: v(1),
            system: v(2),
            idle: v(3),
            iowait: v(4),
            irq: v(5),
            softirq: v(6),
            steal: v(7),
        })
    }

    /// Parses `/proc/meminfo` lines.
    ///
    /// Falls back to `MemFree + Buffers + Cached` when `MemAvailable` is
    /// absent (kernels before 3.14).
    pub fn parse_meminfo(output: &str) -> MonitoringResult<MemoryMetrics> {
        let mut total_kib = None;
        let mut available_kib = None;
        let mut free_kib: u64 = 0;
        let mut reclaimable_kib: u64 = 0;
        let mut swap_total_kib: u64 = 0;
        let mut swap_free_kib: u64 = 0;

        for line in output.lines() {
            let Some((key, rest)) = line.split_once(':') else {
                continue;
            };
            let value = Self::parse_kib_value(rest);
            match key.trim() {
                "MemTotal" => total_kib = value,
                "MemAvailable" => available_kib = value,
                "MemFree" => free_kib = value.unwrap_or(0),
                "Buffers" | "Cached" => reclaimable_kib += value.unwrap_or(0),
                "SwapTotal" => swap_total_kib = value.unwrap_or(0),
                "SwapFree" => swap_free_kib = value.unwrap_or(0),
                _ => {}
            }
        }

        let total_kib = total_kib.filter(|t| *t > 0).ok_or_else(|| {
            MonitoringError::parse(CommandKind::Memory, "MemTotal not found")
        })?;
        let available_kib = available_kib
            .unwrap_or(free_kib + reclaimable_kib)
            .min(total_kib);

        Ok(MemoryMetrics {
            total_kib,
            used_kib: total_kib - available_kib,
            available_kib,
            swap_total_kib,
            swap_used_kib: swap_total_kib.saturating_sub(swap_free_kib),
        })
    }

    /// Parses a value like `  16384000 kB` into KiB
    fn parse_kib_value(s: &str) -> Option<u64> {
        s.split_whitespace().next().and_then(|v| v.parse().ok())
    }

    /// Parses `/proc/net/dev` and sums rx/tx bytes across all non-lo interfaces.
    pub fn parse_net_dev(output: &str) -> MonitoringResult<NetworkCounters> {
        let mut counters = NetworkCounters::default();
        let mut recognised = 0usize;

        for line in output.lines() {
            // Format: iface: rx_bytes rx_packets ... tx_bytes tx_packets ...
            let Some((iface, stats)) = line.trim().split_once(':') else {
                continue;
            };
            let parts: Vec<&str> = stats.split_whitespace().collect();
            if parts.len() < 9 {
                continue;
            }
            let (Ok(rx), Ok(tx)) = (parts[0].parse::<u64>(), parts[8].parse::<u64>()) else {
                continue;
            };
            recognised += 1;
            if iface.trim() == "lo" {
                continue;
            }
            counters.rx_bytes = counters.rx_bytes.saturating_add(rx);
            counters.tx_bytes = counters.tx_bytes.saturating_add(tx);
        }

        if recognised == 0 {
            return Err(MonitoringError::parse(
                CommandKind::Network,
                "no interface lines",
            ));
        }
        Ok(counters)
    }

    /// Parses `df -Pk /` output for root filesystem metrics.
    ///
    /// Format: `Filesystem  1024-blocks  Used  Available  Capacity  Mounted`
    pub fn parse_df(output: &str) -> MonitoringResult<DiskMetrics> {
        let line = output
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| MonitoringError::parse(CommandKind::Disk, "empty df output"))?;

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            return Err(MonitoringError::parse(
                CommandKind::Disk,
                "too few fields in df output",
            ));
        }

        let field = |i: usize| {
            parts[i].parse::<u64>().map_err(|_| {
                MonitoringError::parse(CommandKind::Disk, format!("not a number: '{}'", parts[i]))
            })
        };

        Ok(DiskMetrics {
            total_kib: field(1)?,
            used_kib: field(2)?,
            available_kib: field(3)?,
        })
    }

    /// Parses `/proc/loadavg`.
    ///
    /// Format: `0.52 0.34 0.28 2/1234 56789`
    pub fn parse_loadavg(output: &str) -> MonitoringResult<LoadAverage> {
        let parts: Vec<f32> = output
            .split_whitespace()
            .take(3)
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|e| MonitoringError::parse(CommandKind::Load, format!("{e}")))?;

        match parts.as_slice() {
            [one, five, fifteen] => Ok(LoadAverage {
                one: *one,
                five: *five,
                fifteen: *fifteen,
            }),
            _ => Err(MonitoringError::parse(
                CommandKind::Load,
                "too few fields in /proc/loadavg",
            )),
        }
    }

    /// Parses `ps -eo pcpu=,pmem=,comm=` output.
    ///
    /// The command name is last because it may contain spaces.
    pub fn parse_processes(&self, output: &str) -> MonitoringResult<ProcessList> {
        let mut entries: Vec<ProcessEntry> = output
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let cpu = parts.next()?.parse::<f32>().ok()?;
                let mem = parts.next()?.parse::<f32>().ok()?;
                let name = parts.collect::<Vec<_>>().join(" ");
                (!name.is_empty()).then_some(ProcessEntry {
                    name,
                    cpu_percent: cpu,
                    memory_percent: mem,
                })
            })
            .collect();

        if entries.is_empty() {
            return Err(MonitoringError::parse(
                CommandKind::Processes,
                "no process rows",
            ));
        }

        let count = u32::try_from(entries.len()).unwrap_or(u32::MAX);
        entries.sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent));
        entries.truncate(self.top_processes);

        Ok(ProcessList {
            count,
            top: entries,
        })
    }

    /// Extracts text between two marker lines
    fn section<'a>(output: &'a str, start: &str, end: &str) -> Option<&'a str> {
        let start_idx = output.find(start).map(|i| i + start.len())?;
        let end_idx = output[start_idx..].find(end).map(|i| start_idx + i)?;
        Some(output[start_idx..end_idx].trim())
    }

    /// Parses the output of the system info command into [`SystemInfo`].
    ///
    /// # Errors
    ///
    /// Returns [`MonitoringError::ParseError`] if the terminating marker is
    /// missing, which means the command did not run to completion.
    pub fn parse_system_info(output: &str) -> MonitoringResult<SystemInfo> {
        if !output.contains("---FLEETMON_SYSINFO_END---") {
            return Err(MonitoringError::parse(
                CommandKind::SystemInfo,
                "output truncated",
            ));
        }

        let hostname = Self::section(output, "---FLEETMON_HOSTNAME---", "---FLEETMON_UNAME---")
            .map(ToString::to_string)
            .unwrap_or_default();

        let kernel_version =
            Self::section(output, "---FLEETMON_UNAME---", "---FLEETMON_OSRELEASE---")
                .map(ToString::to_string)
                .unwrap_or_default();

        let distro_name =
            Self::section(output, "---FLEETMON_OSRELEASE---", "---FLEETMON_UPTIME---")
                .and_then(Self::extract_pretty_name)
                .unwrap_or_default();

        let uptime_secs = Self::section(output, "---FLEETMON_UPTIME---", "---FLEETMON_HWINFO---")
            .and_then(|s| {
                s.split_whitespace()
                    .next()
                    .and_then(|v| v.parse::<f64>().ok())
            })
            .map(|v| v as u64)
            .unwrap_or(0);

        let hwinfo = Self::section(
            output,
            "---FLEETMON_HWINFO---",
            "---FLEETMON_SYSINFO_END---",
        )
        .unwrap_or("");

        let total_ram_kib = hwinfo
            .lines()
            .find_map(|l| l.strip_prefix("MemTotal:"))
            .and_then(Self::parse_kib_value)
            .unwrap_or(0);

        let cpu_threads = Self::extract_hwinfo_u16(hwinfo, "CPUTHREADS=");
        let cpu_cores = Self::extract_hwinfo_u16(hwinfo, "CPUCORES=");
        // Single-core and some ARM boards omit "cpu cores"
        let cpu_cores = if cpu_cores == 0 {
            cpu_threads
        } else {
            cpu_cores
        };

        let arch = hwinfo
            .lines()
            .find_map(|l| l.strip_prefix("ARCH="))
            .unwrap_or("")
            .trim()
            .to_string();

        Ok(SystemInfo {
            hostname,
            kernel_version,
            distro_name,
            uptime_secs,
            total_ram_kib,
            cpu_cores,
            cpu_threads,
            arch,
        })
    }

    /// Extracts a `u16` value from a `KEY=value` line in hardware info output
    fn extract_hwinfo_u16(hwinfo: &str, prefix: &str) -> u16 {
        hwinfo
            .lines()
            .find_map(|l| l.strip_prefix(prefix))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Extracts `PRETTY_NAME` from `/etc/os-release` content, falling back
    /// to `NAME` + `VERSION` if `PRETTY_NAME` is absent.
    fn extract_pretty_name(os_release: &str) -> Option<String> {
        let mut pretty_name = None;
        let mut name = None;
        let mut version = None;

        for line in os_release.lines() {
            if let Some(val) = line.strip_prefix("PRETTY_NAME=") {
                pretty_name = Some(val.trim_matches('"').to_string());
            } else if let Some(val) = line.strip_prefix("NAME=") {
                name = Some(val.trim_matches('"').to_string());
            } else if let Some(val) = line.strip_prefix("VERSION=") {
                version = Some(val.trim_matches('"').to_string());
            }
        }

        pretty_name
            .or_else(|| name.map(|n| version.map_or_else(|| n.clone(), |v| format!("{n} {v}"))))
    }
}
