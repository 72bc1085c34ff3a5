//! CLI error types and exit codes.

use fleetmon_core::error::{ConfigError, FleetMonError, ScanError, SessionError};

/// Exit codes for CLI operations
pub mod exit_codes {
    /// General error - configuration, validation, or other non-connection errors
    pub const GENERAL_ERROR: i32 = 1;
    /// Connection failure - a session could not be established or broke
    pub const CONNECTION_FAILURE: i32 = 2;
}

/// CLI error type
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No saved host matches
    #[error("Host not found: {0}")]
    HostNotFound(String),

    /// Invalid argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Scan error
    #[error("Scan error: {0}")]
    Scan(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<ScanError> for CliError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::InvalidRange { .. } | ScanError::EmptyRanges => {
                Self::InvalidInput(err.to_string())
            }
            ScanError::ProbeUnavailable(_) | ScanError::AlreadyRunning(_) => {
                Self::Scan(err.to_string())
            }
        }
    }
}

impl From<SessionError> for CliError {
    fn from(err: SessionError) -> Self {
        Self::Connection(err.to_string())
    }
}

impl From<FleetMonError> for CliError {
    fn from(err: FleetMonError) -> Self {
        match err {
            FleetMonError::Config(e) => e.into(),
            FleetMonError::Session(e) => e.into(),
            FleetMonError::Scan(e) => e.into(),
            FleetMonError::Registry(e) => Self::Config(e.to_string()),
            FleetMonError::Io(e) => Self::Io(e),
        }
    }
}

impl CliError {
    /// Returns the appropriate exit code for this error type.
    ///
    /// Exit codes:
    /// - 0: Success (not an error)
    /// - 1: General error (configuration, input, scan, IO)
    /// - 2: Connection failure
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Connection(_) => exit_codes::CONNECTION_FAILURE,
            Self::Config(_)
            | Self::HostNotFound(_)
            | Self::InvalidInput(_)
            | Self::Scan(_)
            | Self::Io(_) => exit_codes::GENERAL_ERROR,
        }
    }
}
