//! Error types for `FleetMon`
//!
//! Each component has its own error enum; [`FleetMonError`] aggregates them
//! for callers that drive several components at once (the CLI, tests).

use std::time::Duration;

use thiserror::Error;

use crate::models::SessionState;

/// Top-level error type for `FleetMon` operations
#[derive(Debug, Error)]
pub enum FleetMonError {
    /// Configuration load/save failure
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Session lifecycle failure
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Discovery failure
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Registry access failure
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias for [`FleetMonError`]
pub type FleetMonResult<T> = std::result::Result<T, FleetMonError>;

/// Errors raised while loading or saving configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config directory could not be determined
    #[error("Could not determine configuration directory")]
    NoConfigDir,

    /// Reading or writing a config file failed
    #[error("Failed to access '{path}': {source}")]
    Io {
        /// File that failed
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A config file could not be parsed
    #[error("Failed to parse '{path}': {reason}")]
    Parse {
        /// File that failed
        path: String,
        /// Parser message
        reason: String,
    },

    /// Serialisation of a config value failed
    #[error("Failed to serialize configuration: {0}")]
    Serialize(String),

    /// A setting is outside its allowed range
    #[error("Invalid setting '{field}': {reason}")]
    Invalid {
        /// Dotted setting name
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Result alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Errors produced by the remote session lifecycle
///
/// The first five variants form the fleet error taxonomy; every one of them
/// is also written to the affected host's `last_error`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The host could not be reached (refused, no route, DNS failure)
    #[error("Host unreachable: {0}")]
    Unreachable(String),

    /// Credentials were rejected
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Operation exceeded its bound
    #[error("Operation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// An established session stopped working
    #[error("Session broken: {0}")]
    BrokenSession(String),

    /// Remote output could not be parsed
    #[error("Failed to parse remote output: {0}")]
    ParseError(String),

    /// A remote command ran but exited non-zero
    #[error("Remote command failed: {0}")]
    CommandFailed(String),

    /// No live session exists for the host
    #[error("Host '{0}' is not connected")]
    NotConnected(String),

    /// The host is not in the registry
    #[error("Unknown host: {0}")]
    UnknownHost(String),

    /// The SSH client binaries are missing
    #[error("Remote transport unavailable: {0}")]
    TransportUnavailable(String),

    /// The registry refused the state change
    #[error("Invalid session transition {from} -> {to}")]
    InvalidTransition {
        /// State the host was in
        from: SessionState,
        /// Requested state
        to: SessionState,
    },
}

impl SessionError {
    /// Returns true if the error means the channel itself is unusable
    #[must_use]
    pub const fn is_broken_session(&self) -> bool {
        matches!(self, Self::BrokenSession(_))
    }

    /// Returns true if automatic reconnection may recover from this error
    ///
    /// Rejected credentials never heal on their own.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unreachable(_) | Self::Timeout(_) | Self::BrokenSession(_)
        )
    }
}

/// Result alias for session operations
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Errors from network discovery
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// An address range could not be parsed
    #[error("Invalid address range '{range}': {reason}")]
    InvalidRange {
        /// Range as given
        range: String,
        /// Parser message
        reason: String,
    },

    /// The probe mechanism cannot run on this system at all
    #[error("Probe mechanism unavailable: {0}")]
    ProbeUnavailable(String),

    /// Another scan is still running
    #[error("A scan is already running (job {0})")]
    AlreadyRunning(uuid::Uuid),

    /// No ranges were given
    #[error("No address ranges to scan")]
    EmptyRanges,
}

/// Result alias for scan operations
pub type ScanResult<T> = std::result::Result<T, ScanError>;

/// Errors from [`crate::registry::FleetRegistry`] accessors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The address is not registered
    #[error("Unknown host: {0}")]
    HostNotFound(String),

    /// The address is already registered
    #[error("Host already registered: {0}")]
    DuplicateHost(String),

    /// The state machine forbids this transition
    #[error("Invalid transition for '{address}': {from} -> {to}")]
    InvalidTransition {
        /// Host address
        address: String,
        /// Current state
        from: SessionState,
        /// Requested state
        to: SessionState,
    },

    /// A sample was not newer than the last one in the buffer
    #[error("Sample for '{0}' is not newer than the latest recorded sample")]
    StaleSample(String),

    /// Samples are only recorded for connected hosts
    #[error("Host '{0}' is not connected")]
    NotConnected(String),
}

/// Result alias for registry operations
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

impl From<RegistryError> for SessionError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::HostNotFound(address) => Self::UnknownHost(address),
            RegistryError::NotConnected(address) => Self::NotConnected(address),
            RegistryError::InvalidTransition { from, to, .. } => {
                Self::InvalidTransition { from, to }
            }
            other => Self::CommandFailed(other.to_string()),
        }
    }
}
