//! Threshold alerts on collected samples
//!
//! Every recorded [`Sample`] is checked against [`AlertThresholds`]. A metric
//! strictly above its threshold raises an [`Alert`]; the registry keeps the
//! most recent alerts of each host in a bounded [`AlertHistory`].

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::monitoring::Sample;

/// Default number of alerts kept per host
pub const DEFAULT_ALERT_HISTORY: usize = 100;

/// Default CPU usage threshold (percent)
pub const DEFAULT_CPU_THRESHOLD: f32 = 80.0;

/// Default memory usage threshold (percent)
pub const DEFAULT_MEMORY_THRESHOLD: f32 = 80.0;

/// Default root filesystem usage threshold (percent)
pub const DEFAULT_DISK_THRESHOLD: f32 = 90.0;

/// Which metric crossed its threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// CPU usage
    CpuHigh,
    /// Memory usage
    MemoryHigh,
    /// Root filesystem usage
    DiskHigh,
}

impl AlertKind {
    /// Metric name for messages
    #[must_use]
    pub const fn metric(self) -> &'static str {
        match self {
            Self::CpuHigh => "CPU",
            Self::MemoryHigh => "memory",
            Self::DiskHigh => "disk",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CpuHigh => write!(f, "cpu_high"),
            Self::MemoryHigh => write!(f, "memory_high"),
            Self::DiskHigh => write!(f, "disk_high"),
        }
    }
}

/// A threshold crossing on one host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Host address
    pub host: String,
    /// Metric that crossed
    pub kind: AlertKind,
    /// Observed value (percent)
    pub value: f32,
    /// Threshold in effect (percent)
    pub threshold: f32,
    /// Timestamp of the sample that raised it
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    /// Operator-facing message, e.g. `High CPU usage: 92.5%`
    #[must_use]
    pub fn message(&self) -> String {
        format!("High {} usage: {:.1}%", self.kind.metric(), self.value)
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (threshold {:.1}%)",
            self.host,
            self.message(),
            self.threshold
        )
    }
}

/// Per-metric alert thresholds, in percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertThresholds {
    /// CPU usage above this raises [`AlertKind::CpuHigh`]
    pub cpu_percent: f32,
    /// Memory usage above this raises [`AlertKind::MemoryHigh`]
    pub memory_percent: f32,
    /// Disk usage above this raises [`AlertKind::DiskHigh`]
    pub disk_percent: f32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            cpu_percent: DEFAULT_CPU_THRESHOLD,
            memory_percent: DEFAULT_MEMORY_THRESHOLD,
            disk_percent: DEFAULT_DISK_THRESHOLD,
        }
    }
}

impl AlertThresholds {
    /// Alerts raised by `sample`. Metrics missing from a degraded sample
    /// raise nothing.
    #[must_use]
    pub fn evaluate(&self, host: &str, sample: &Sample) -> Vec<Alert> {
        [
            (AlertKind::CpuHigh, sample.cpu_percent, self.cpu_percent),
            (AlertKind::MemoryHigh, sample.memory_percent(), self.memory_percent),
            (AlertKind::DiskHigh, sample.disk_percent(), self.disk_percent),
        ]
        .into_iter()
        .filter_map(|(kind, value, threshold)| {
            let value = value?;
            (value > threshold).then(|| Alert {
                host: host.to_string(),
                kind,
                value,
                threshold,
                timestamp: sample.timestamp,
            })
        })
        .collect()
    }
}

/// Bounded list of alerts, oldest first
#[derive(Debug, Clone)]
pub struct AlertHistory {
    alerts: VecDeque<Alert>,
    capacity: usize,
}

impl Default for AlertHistory {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_HISTORY)
    }
}

impl AlertHistory {
    /// Creates an empty history. A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            alerts: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Appends an alert, evicting the oldest when full
    pub fn push(&mut self, alert: Alert) {
        if self.alerts.len() == self.capacity {
            self.alerts.pop_front();
        }
        self.alerts.push_back(alert);
    }

    /// Copies the alerts, oldest first
    #[must_use]
    pub fn to_vec(&self) -> Vec<Alert> {
        self.alerts.iter().cloned().collect()
    }

    /// Number of stored alerts
    #[must_use]
    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    /// Returns true if no alerts are stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    /// Drops every alert
    pub fn clear(&mut self) {
        self.alerts.clear();
    }
}

impl Extend<Alert> for AlertHistory {
    fn extend<I: IntoIterator<Item = Alert>>(&mut self, iter: I) {
        for alert in iter {
            self.push(alert);
        }
    }
}
