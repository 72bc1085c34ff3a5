//! Network discovery
//!
//! Parses address ranges, probes them concurrently and feeds live hosts into
//! the [`FleetRegistry`](crate::registry::FleetRegistry).

mod probe;
mod range;
mod scanner;

pub use probe::{PingProbe, Probe, ProbeMechanism, ProbeOutcome, TcpProbe};
pub use range::{AddressRange, expand, parse_ranges, total_addresses};
pub use scanner::{
    DEFAULT_PROBE_TIMEOUT, DEFAULT_SCAN_CONCURRENCY, DiscoveredHost, Prober, ScanJob,
    ScanOptions, ScanProgress, ScanStream, ScanSummary,
};
