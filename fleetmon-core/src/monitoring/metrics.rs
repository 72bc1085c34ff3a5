//! Data models for remote host metrics
//!
//! All types are serializable so snapshots can be exported as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One timestamped metrics reading from one host
///
/// Every metric is optional: when a command in the collection batch fails
/// the corresponding field is `None` and the rest of the sample is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// When the batch finished
    pub timestamp: DateTime<Utc>,
    /// CPU usage (0.0–100.0)
    pub cpu_percent: Option<f32>,
    /// Memory details
    pub memory: Option<MemoryMetrics>,
    /// Root filesystem details
    pub disk: Option<DiskMetrics>,
    /// Cumulative interface counters (loopback excluded)
    pub network: Option<NetworkCounters>,
    /// Load average
    pub load_average: Option<LoadAverage>,
    /// Number of processes
    pub process_count: Option<u32>,
    /// Busiest processes by CPU, bounded to the configured top-N
    pub top_processes: Option<Vec<ProcessEntry>>,
}

impl Sample {
    /// Creates an empty sample stamped with the current time
    #[must_use]
    pub fn empty() -> Self {
        Self::empty_at(Utc::now())
    }

    /// Creates an empty sample with the given timestamp
    #[must_use]
    pub const fn empty_at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            cpu_percent: None,
            memory: None,
            disk: None,
            network: None,
            load_average: None,
            process_count: None,
            top_processes: None,
        }
    }

    /// Memory usage percentage
    #[must_use]
    pub fn memory_percent(&self) -> Option<f32> {
        self.memory.as_ref().map(MemoryMetrics::percent)
    }

    /// Root filesystem usage percentage
    #[must_use]
    pub fn disk_percent(&self) -> Option<f32> {
        self.disk.as_ref().map(DiskMetrics::percent)
    }

    /// Number of metric groups that could not be collected
    #[must_use]
    pub fn missing_fields(&self) -> usize {
        [
            self.cpu_percent.is_none(),
            self.memory.is_none(),
            self.disk.is_none(),
            self.network.is_none(),
            self.process_count.is_none(),
        ]
        .into_iter()
        .filter(|missing| *missing)
        .count()
    }

    /// Returns true if at least one metric group is absent
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.missing_fields() > 0
    }
}

/// Memory usage metrics in kibibytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    /// Total physical memory (KiB)
    pub total_kib: u64,
    /// Used memory (KiB), total minus available
    pub used_kib: u64,
    /// Available memory (KiB), includes reclaimable caches
    pub available_kib: u64,
    /// Total swap space (KiB)
    pub swap_total_kib: u64,
    /// Used swap space (KiB)
    pub swap_used_kib: u64,
}

impl MemoryMetrics {
    /// Returns memory usage as a percentage (0.0–100.0)
    #[must_use]
    pub fn percent(&self) -> f32 {
        if self.total_kib == 0 {
            return 0.0;
        }
        (self.used_kib as f32 / self.total_kib as f32) * 100.0
    }

    /// Returns swap usage as a percentage (0.0–100.0), or 0 if no swap
    #[must_use]
    pub fn swap_percent(&self) -> f32 {
        if self.swap_total_kib == 0 {
            return 0.0;
        }
        (self.swap_used_kib as f32 / self.swap_total_kib as f32) * 100.0
    }
}

/// Disk usage metrics for the root filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskMetrics {
    /// Total disk space (KiB)
    pub total_kib: u64,
    /// Used disk space (KiB)
    pub used_kib: u64,
    /// Available disk space (KiB)
    pub available_kib: u64,
}

impl DiskMetrics {
    /// Returns disk usage as a percentage (0.0–100.0)
    #[must_use]
    pub fn percent(&self) -> f32 {
        if self.total_kib == 0 {
            return 0.0;
        }
        (self.used_kib as f32 / self.total_kib as f32) * 100.0
    }
}

/// Cumulative network counters from `/proc/net/dev`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkCounters {
    /// Total received bytes
    pub rx_bytes: u64,
    /// Total transmitted bytes
    pub tx_bytes: u64,
}

impl NetworkCounters {
    /// Bytes per second between an earlier reading and this one
    ///
    /// Counter resets (reboot, interface removal) yield zero, not a
    /// negative rate.
    #[must_use]
    pub fn rate_since(&self, prev: &Self, elapsed_secs: f64) -> (f64, f64) {
        if elapsed_secs <= 0.0 {
            return (0.0, 0.0);
        }
        let rx = self.rx_bytes.saturating_sub(prev.rx_bytes) as f64 / elapsed_secs;
        let tx = self.tx_bytes.saturating_sub(prev.tx_bytes) as f64 / elapsed_secs;
        (rx, tx)
    }
}

/// Raw CPU counters from `/proc/stat` for delta calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuSnapshot {
    /// Total user time (jiffies)
    pub user: u64,
    /// Total nice time (jiffies)
    pub nice: u64,
    /// Total system time (jiffies)
    pub system: u64,
    /// Total idle time (jiffies)
    pub idle: u64,
    /// Total iowait time (jiffies)
    pub iowait: u64,
    /// Total irq time (jiffies)
    pub irq: u64,
    /// Total softirq time (jiffies)
    pub softirq: u64,
    /// Total steal time (jiffies)
    pub steal: u64,
}

impl CpuSnapshot {
    /// Total jiffies across all states
    #[must_use]
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    /// Total idle jiffies (idle + iowait)
    #[must_use]
    pub fn idle_total(&self) -> u64 {
        self.idle + self.iowait
    }

    /// Calculates CPU usage percentage between two snapshots
    #[must_use]
    pub fn cpu_percent_since(&self, prev: &Self) -> f32 {
        let total_delta = self.total().saturating_sub(prev.total());
        if total_delta == 0 {
            return 0.0;
        }
        let idle_delta = self.idle_total().saturating_sub(prev.idle_total());
        let busy_delta = total_delta.saturating_sub(idle_delta);
        (busy_delta as f32 / total_delta as f32) * 100.0
    }
}

/// Load average values from `/proc/loadavg`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LoadAverage {
    /// 1-minute load average
    pub one: f32,
    /// 5-minute load average
    pub five: f32,
    /// 15-minute load average
    pub fifteen: f32,
}

/// One row of the process table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessEntry {
    /// Command name
    pub name: String,
    /// CPU share (may exceed 100 on multi-core hosts)
    pub cpu_percent: f32,
    /// Memory share
    pub memory_percent: f32,
}

/// Parsed process table
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcessList {
    /// Total processes reported
    pub count: u32,
    /// Busiest processes, sorted by CPU descending
    pub top: Vec<ProcessEntry>,
}

/// Static system information collected once after connecting.
///
/// These values don't change between polling intervals, so they are
/// fetched once and cached on the host record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Remote host name (`uname -n`)
    pub hostname: String,
    /// Kernel version (e.g. "6.8.0-45-generic")
    pub kernel_version: String,
    /// Distribution name (e.g. "Ubuntu 24.04.1 LTS")
    pub distro_name: String,
    /// System uptime in seconds
    pub uptime_secs: u64,
    /// Total physical RAM in KiB
    pub total_ram_kib: u64,
    /// Number of physical CPU cores
    pub cpu_cores: u16,
    /// Number of logical CPU threads
    pub cpu_threads: u16,
    /// CPU architecture (e.g. "x86_64", "aarch64")
    pub arch: String,
}
