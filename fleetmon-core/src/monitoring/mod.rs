//! Remote host metrics
//!
//! Agentless collection: a fixed set of shell commands reads `/proc/*`, `df`
//! and `ps` on the remote Linux host, and typed parsers turn the output into
//! [`Sample`]s.

mod collector;
mod command;
mod metrics;
mod parser;

pub use collector::{CollectError, DEFAULT_COMMAND_TIMEOUT, MetricCollector};
pub use command::{CommandKind, LIVENESS_MARKER};
pub use metrics::{
    CpuSnapshot, DiskMetrics, LoadAverage, MemoryMetrics, NetworkCounters, ProcessEntry,
    ProcessList, Sample, SystemInfo,
};
pub use parser::{
    CommandOutput, DEFAULT_TOP_PROCESSES, MetricsParser, MonitoringError, MonitoringResult,
};
