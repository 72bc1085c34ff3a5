//! Application settings stored in `config.toml`

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alert::{
    AlertThresholds, DEFAULT_CPU_THRESHOLD, DEFAULT_DISK_THRESHOLD, DEFAULT_MEMORY_THRESHOLD,
};
use crate::discovery::{
    DEFAULT_PROBE_TIMEOUT, DEFAULT_SCAN_CONCURRENCY, ProbeMechanism, ScanOptions,
};
use crate::error::{ConfigError, ConfigResult};
use crate::models::DEFAULT_SSH_PORT;
use crate::monitoring::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_TOP_PROCESSES};
use crate::poller::{
    DEFAULT_PER_HOST_TIMEOUT, DEFAULT_POLL_CONCURRENCY, DEFAULT_POLL_INTERVAL,
    DEFAULT_TIMEOUT_THRESHOLD, PollConfig,
};
use crate::registry::DEFAULT_HISTORY_CAPACITY;
use crate::session::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_LIVENESS_TIMEOUT, RetryConfig, SessionConfig,
};
use crate::tracing::TracingLevel;

/// Upper bound for probes or collections in flight
const MAX_CONCURRENCY: usize = 4096;

/// Upper bound for per-host history
const MAX_HISTORY_CAPACITY: usize = 100_000;

/// Root settings structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetSettings {
    /// Discovery
    pub scan: ScanSettings,
    /// Session establishment
    pub session: SessionSettings,
    /// Automatic reconnects
    pub retry: RetryConfig,
    /// Periodic collection
    pub poll: PollSettings,
    /// Per-host time series
    pub history: HistorySettings,
    /// Threshold alerts
    pub alert: AlertSettings,
    /// Log output
    pub logging: LoggingSettings,
}

/// Discovery settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Per-probe timeout in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Probes in flight at once
    #[serde(default = "default_scan_concurrency")]
    pub max_concurrency: usize,
    /// Port probed and used for discovered hosts
    #[serde(default = "default_port")]
    pub port: u16,
    /// How liveness is decided
    #[serde(default)]
    pub mechanism: ProbeMechanism,
    /// Read the SSH banner of live hosts
    #[serde(default = "default_true")]
    pub read_banner: bool,
    /// Ranges scanned when none are given
    #[serde(default)]
    pub default_ranges: Vec<String>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout_ms(),
            max_concurrency: default_scan_concurrency(),
            port: default_port(),
            mechanism: ProbeMechanism::default(),
            read_banner: true,
            default_ranges: Vec::new(),
        }
    }
}

/// Session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Connect and authenticate timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Per-command timeout in seconds
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Post-connect liveness check timeout in seconds
    #[serde(default = "default_liveness_timeout_secs")]
    pub liveness_timeout_secs: u64,
    /// `StrictHostKeyChecking` value passed to ssh
    #[serde(default = "default_host_key_policy")]
    pub host_key_policy: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            command_timeout_secs: default_command_timeout_secs(),
            liveness_timeout_secs: default_liveness_timeout_secs(),
            host_key_policy: default_host_key_policy(),
        }
    }
}

/// Polling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// Seconds between ticks
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
    /// Per-host collection timeout in seconds
    #[serde(default = "default_per_host_timeout_secs")]
    pub per_host_timeout_secs: u64,
    /// Hosts collected at once
    #[serde(default = "default_poll_concurrency")]
    pub max_concurrency: usize,
    /// Consecutive timeouts before the session is dropped
    #[serde(default = "default_timeout_threshold")]
    pub timeout_threshold: u32,
    /// Processes kept per sample
    #[serde(default = "default_top_processes")]
    pub top_processes: usize,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
            per_host_timeout_secs: default_per_host_timeout_secs(),
            max_concurrency: default_poll_concurrency(),
            timeout_threshold: default_timeout_threshold(),
            top_processes: default_top_processes(),
        }
    }
}

/// History settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    /// Samples kept per host
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
        }
    }
}

/// Alert settings, thresholds in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    /// Evaluate thresholds on every recorded sample
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// CPU usage threshold
    #[serde(default = "default_cpu_threshold")]
    pub cpu_threshold: f32,
    /// Memory usage threshold
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold: f32,
    /// Root filesystem usage threshold
    #[serde(default = "default_disk_threshold")]
    pub disk_threshold: f32,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cpu_threshold: default_cpu_threshold(),
            memory_threshold: default_memory_threshold(),
            disk_threshold: default_disk_threshold(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Base level; `-v` flags raise it
    pub level: TracingLevel,
    /// Optional log file instead of stderr
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl FleetSettings {
    /// Checks every field and clamps soft limits.
    ///
    /// Zero timeouts, zero concurrency, an empty history and alert
    /// thresholds outside 0..=100 are rejected; oversized concurrency and
    /// history are clamped.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&mut self) -> ConfigResult<()> {
        require_nonzero("scan.probe_timeout_ms", self.scan.probe_timeout_ms)?;
        require_nonzero("scan.max_concurrency", self.scan.max_concurrency as u64)?;
        require_nonzero("scan.port", u64::from(self.scan.port))?;
        require_nonzero("session.connect_timeout_secs", self.session.connect_timeout_secs)?;
        require_nonzero("session.command_timeout_secs", self.session.command_timeout_secs)?;
        require_nonzero("session.liveness_timeout_secs", self.session.liveness_timeout_secs)?;
        require_nonzero("poll.interval_secs", self.poll.interval_secs)?;
        require_nonzero("poll.per_host_timeout_secs", self.poll.per_host_timeout_secs)?;
        require_nonzero("poll.max_concurrency", self.poll.max_concurrency as u64)?;
        require_nonzero("poll.timeout_threshold", u64::from(self.poll.timeout_threshold))?;
        require_nonzero("history.capacity", self.history.capacity as u64)?;
        require_percent("alert.cpu_threshold", self.alert.cpu_threshold)?;
        require_percent("alert.memory_threshold", self.alert.memory_threshold)?;
        require_percent("alert.disk_threshold", self.alert.disk_threshold)?;

        if !matches!(
            self.session.host_key_policy.as_str(),
            "yes" | "no" | "accept-new" | "ask"
        ) {
            return Err(ConfigError::Invalid {
                field: "session.host_key_policy",
                reason: format!(
                    "'{}' is not one of yes, no, accept-new, ask",
                    self.session.host_key_policy
                ),
            });
        }

        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid {
                field: "retry.backoff_multiplier",
                reason: "must be a finite number >= 1.0".into(),
            });
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(ConfigError::Invalid {
                field: "retry.max_delay_ms",
                reason: "must not be below retry.initial_delay_ms".into(),
            });
        }

        self.scan.max_concurrency = self.scan.max_concurrency.min(MAX_CONCURRENCY);
        self.poll.max_concurrency = self.poll.max_concurrency.min(MAX_CONCURRENCY);
        self.history.capacity = self.history.capacity.min(MAX_HISTORY_CAPACITY);
        self.poll.top_processes = self.poll.top_processes.max(1);
        Ok(())
    }

    /// Scanner options
    #[must_use]
    pub const fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            probe_timeout: Duration::from_millis(self.scan.probe_timeout_ms),
            max_concurrency: self.scan.max_concurrency,
        }
    }

    /// Session manager tunables
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            connect_timeout: Duration::from_secs(self.session.connect_timeout_secs),
            liveness_timeout: Duration::from_secs(self.session.liveness_timeout_secs),
            command_timeout: Duration::from_secs(self.session.command_timeout_secs),
            retry: self.retry.clone(),
            top_processes: self.poll.top_processes,
        }
    }

    /// Poller tunables
    #[must_use]
    pub const fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(self.poll.interval_secs),
            per_host_timeout: Duration::from_secs(self.poll.per_host_timeout_secs),
            max_concurrency: self.poll.max_concurrency,
            timeout_threshold: self.poll.timeout_threshold,
        }
    }

    /// Alert thresholds, or `None` when alerting is off
    #[must_use]
    pub const fn alert_thresholds(&self) -> Option<AlertThresholds> {
        if self.alert.enabled {
            Some(AlertThresholds {
                cpu_percent: self.alert.cpu_threshold,
                memory_percent: self.alert.memory_threshold,
                disk_percent: self.alert.disk_threshold,
            })
        } else {
            None
        }
    }
}

fn require_percent(field: &'static str, value: f32) -> ConfigResult<()> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{value} is not a percentage between 0 and 100"),
        })
    }
}

fn require_nonzero(field: &'static str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        Err(ConfigError::Invalid {
            field,
            reason: "must be greater than zero".into(),
        })
    } else {
        Ok(())
    }
}

const fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT.as_millis() as u64
}

const fn default_scan_concurrency() -> usize {
    DEFAULT_SCAN_CONCURRENCY
}

const fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

const fn default_true() -> bool {
    true
}

const fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_secs()
}

const fn default_command_timeout_secs() -> u64 {
    DEFAULT_COMMAND_TIMEOUT.as_secs()
}

const fn default_liveness_timeout_secs() -> u64 {
    DEFAULT_LIVENESS_TIMEOUT.as_secs()
}

fn default_host_key_policy() -> String {
    "accept-new".to_string()
}

const fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

const fn default_per_host_timeout_secs() -> u64 {
    DEFAULT_PER_HOST_TIMEOUT.as_secs()
}

const fn default_poll_concurrency() -> usize {
    DEFAULT_POLL_CONCURRENCY
}

const fn default_timeout_threshold() -> u32 {
    DEFAULT_TIMEOUT_THRESHOLD
}

const fn default_top_processes() -> usize {
    DEFAULT_TOP_PROCESSES
}

const fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

const fn default_cpu_threshold() -> f32 {
    DEFAULT_CPU_THRESHOLD
}

const fn default_memory_threshold() -> f32 {
    DEFAULT_MEMORY_THRESHOLD
}

const fn default_disk_threshold() -> f32 {
    DEFAULT_DISK_THRESHOLD
}
