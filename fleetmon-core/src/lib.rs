//! FleetMon Core Library
//!
//! Fleet discovery, remote-session lifecycle and multi-host metric polling.
//!
//! # Crate Structure
//!
//! - [`discovery`] - Address ranges and the concurrent [`Prober`]
//! - [`session`] - Transport seam, SSH transport, retry policy, [`SessionManager`]
//! - [`monitoring`] - Fixed remote commands, output parsers, [`MetricCollector`]
//! - [`registry`] - The shared [`FleetRegistry`] with per-host history buffers
//! - [`poller`] - Periodic collection across connected hosts
//! - [`alert`] - Threshold alerts on recorded samples
//! - [`config`] - Settings and saved hosts in TOML
//! - [`tracing`] - Logging setup and span names
//! - [`testing`] - Scripted transport and probe doubles
//!
//! The registry is always passed explicitly; there is no global fleet
//! state.

#![warn(missing_docs)]

pub mod alert;
pub mod cancel;
pub mod config;
pub mod discovery;
pub mod error;
pub mod models;
pub mod monitoring;
pub mod poller;
pub mod registry;
pub mod session;
pub mod testing;
pub mod tracing;

// Flat re-exports for the CLI and the integration tests. Everything is
// also reachable through its module path.

pub use alert::{Alert, AlertHistory, AlertKind, AlertThresholds};
pub use cancel::CancellationToken;
pub use config::{ConfigManager, FleetSettings};
pub use discovery::{
    AddressRange, DiscoveredHost, ProbeMechanism, Prober, ScanJob, ScanOptions, ScanStream,
    ScanSummary, parse_ranges,
};
pub use error::{
    ConfigError, ConfigResult, FleetMonError, FleetMonResult, RegistryError, RegistryResult,
    ScanError, ScanResult, SessionError, SessionResult,
};
pub use models::{
    AuthMethod, CredentialRef, CredentialSecret, Credentials, DiscoveryOrigin, Host, SavedHost,
    SessionState,
};
pub use monitoring::{
    CommandKind, CommandOutput, MetricCollector, MetricsParser, ProcessEntry, Sample, SystemInfo,
};
pub use poller::{HostOutcome, PollConfig, Poller, TickReport};
pub use registry::{
    FleetRegistry, FleetSnapshot, FleetSummary, HistoryBuffer, HostSnapshot, RegistryEvent,
};
pub use session::{
    RemoteSession, RemoteTransport, RetryConfig, SessionConfig, SessionManager, SshTransport,
};
pub use tracing::{TracingConfig, TracingLevel, TracingOutput, init_tracing};
