//! Structured logging setup
//!
//! Wires the `tracing` subscriber for the library and the CLI and defines
//! the span and field names used by scans, sessions, and polling.

use std::path::PathBuf;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static TRACING_INITIALIZED: AtomicBool = AtomicBool::new(false);

static TRACING_CONFIG: OnceLock<TracingConfig> = OnceLock::new();

/// Errors that can occur during tracing initialization
#[derive(Debug, Error)]
pub enum TracingError {
    /// Failed to initialize tracing subscriber
    #[error("Failed to initialize tracing: {0}")]
    InitializationFailed(String),

    /// Tracing already initialized
    #[error("Tracing has already been initialized")]
    AlreadyInitialized,

    /// Failed to create log file
    #[error("Failed to create log file: {0}")]
    FileCreationFailed(String),
}

/// Result type for tracing operations
pub type TracingResult<T> = Result<T, TracingError>;

/// Log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TracingLevel {
    /// Only errors
    Error,
    /// Errors and warnings
    Warn,
    /// Errors, warnings, and info (default)
    #[default]
    Info,
    /// All above plus debug messages
    Debug,
    /// Everything
    Trace,
}

impl TracingLevel {
    /// Converts to tracing crate's Level
    #[must_use]
    pub const fn to_tracing_level(self) -> Level {
        match self {
            Self::Error => Level::ERROR,
            Self::Warn => Level::WARN,
            Self::Info => Level::INFO,
            Self::Debug => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// Level for a `-v` count on top of `self`
    #[must_use]
    pub const fn raised_by(self, verbosity: u8) -> Self {
        let base: u8 = match self {
            Self::Error => 0,
            Self::Warn => 1,
            Self::Info => 2,
            Self::Debug => 3,
            Self::Trace => 4,
        };
        match base.saturating_add(verbosity) {
            0 => Self::Error,
            1 => Self::Warn,
            2 => Self::Info,
            3 => Self::Debug,
            _ => Self::Trace,
        }
    }
}

impl std::str::FromStr for TracingLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for TracingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Info => write!(f, "info"),
            Self::Debug => write!(f, "debug"),
            Self::Trace => write!(f, "trace"),
        }
    }
}

/// Output destination for log lines
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TracingOutput {
    /// Output to stdout
    Stdout,
    /// Output to stderr
    #[default]
    Stderr,
    /// Output to a file, truncated on start
    File {
        /// Path to the log file
        path: PathBuf,
    },
}

/// Configuration for tracing initialization
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level
    pub level: TracingLevel,
    /// Output destination
    pub output: TracingOutput,
    /// Include thread ids in each line
    pub thread_ids: bool,
    /// Custom filter string (overrides level if set)
    pub filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: TracingLevel::Info,
            output: TracingOutput::Stderr,
            thread_ids: cfg!(debug_assertions),
            filter: None,
        }
    }
}

impl TracingConfig {
    /// Creates a new tracing configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the log level
    #[must_use]
    pub const fn with_level(mut self, level: TracingLevel) -> Self {
        self.level = level;
        self
    }

    /// Sets the output destination
    #[must_use]
    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    /// Enables or disables thread ids
    #[must_use]
    pub const fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.thread_ids = enabled;
        self
    }

    /// Sets a custom filter string
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Filter directive in effect: the custom filter, else `fleetmon*` at `level`
    #[must_use]
    pub fn directive(&self) -> String {
        self.filter.clone().unwrap_or_else(|| {
            format!(
                "fleetmon_core={level},fleetmon_cli={level},fleetmon={level}",
                level = self.level
            )
        })
    }
}

/// Initializes the global subscriber. Call once at startup.
///
/// # Errors
///
/// Returns an error if tracing is already initialized, the filter is
/// invalid, or the log file cannot be created.
pub fn init_tracing(config: &TracingConfig) -> TracingResult<()> {
    if TRACING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return Err(TracingError::AlreadyInitialized);
    }

    let _ = TRACING_CONFIG.set(config.clone());

    let filter = EnvFilter::try_new(config.directive())
        .map_err(|e| TracingError::InitializationFailed(e.to_string()))?;

    match &config.output {
        TracingOutput::Stdout => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(true)
                        .with_thread_ids(config.thread_ids)
                        .with_writer(std::io::stdout),
                )
                .try_init()
                .map_err(|e| TracingError::InitializationFailed(e.to_string()))?;
        }
        TracingOutput::Stderr => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(true)
                        .with_thread_ids(config.thread_ids)
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .map_err(|e| TracingError::InitializationFailed(e.to_string()))?;
        }
        TracingOutput::File { path } => {
            let file = std::fs::File::create(path)
                .map_err(|e| TracingError::FileCreationFailed(format!("{}: {e}", path.display())))?;

            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(true)
                        .with_thread_ids(config.thread_ids)
                        .with_ansi(false)
                        .with_writer(file),
                )
                .try_init()
                .map_err(|e| TracingError::InitializationFailed(e.to_string()))?;
        }
    }

    tracing::debug!(level = %config.level, "Tracing initialized");
    Ok(())
}

/// Checks if tracing has been initialized
#[must_use]
pub fn is_tracing_initialized() -> bool {
    TRACING_INITIALIZED.load(Ordering::SeqCst)
}

/// Gets the current tracing configuration (if initialized)
#[must_use]
pub fn get_tracing_config() -> Option<&'static TracingConfig> {
    TRACING_CONFIG.get()
}

/// Creates an info span for an operation with standard fields
///
/// ```ignore
/// let span = trace_operation!(span_names::SESSION_CONNECT, host = %address);
/// ```
#[macro_export]
macro_rules! trace_operation {
    ($name:expr) => {
        tracing::info_span!($name)
    };
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!($name, $($field)*)
    };
}

/// Like `trace_operation!` at debug level, for per-host and per-tick work
#[macro_export]
macro_rules! trace_operation_debug {
    ($name:expr) => {
        tracing::debug_span!($name)
    };
    ($name:expr, $($field:tt)*) => {
        tracing::debug_span!($name, $($field)*)
    };
}

/// Standard span names
pub mod span_names {
    /// Range scan
    pub const SCAN_RUN: &str = "scan.run";
    /// Connect request
    pub const SESSION_CONNECT: &str = "session.connect";
    /// Manual or automatic reconnect
    pub const SESSION_RECONNECT: &str = "session.reconnect";
    /// Disconnect request
    pub const SESSION_DISCONNECT: &str = "session.disconnect";
    /// One poll cycle
    pub const POLL_TICK: &str = "poll.tick";
    /// One host within a poll cycle
    pub const POLL_COLLECT: &str = "poll.collect";
    /// Configuration load
    pub const CONFIG_LOAD: &str = "config.load";
    /// Configuration save
    pub const CONFIG_SAVE: &str = "config.save";
}

/// Standard field names for tracing spans
pub mod field_names {
    /// Host address field
    pub const HOST: &str = "host";
    /// Port field
    pub const PORT: &str = "port";
    /// Username field.
    /// WARNING: May contain PII. Use only at debug/trace level.
    pub const USERNAME: &str = "username";
    /// Session state field
    pub const STATE: &str = "state";
    /// Error message field
    pub const ERROR: &str = "error";
    /// Retry attempt field
    pub const ATTEMPT: &str = "attempt";
    /// Duration field (in milliseconds)
    pub const DURATION_MS: &str = "duration_ms";
    /// Scan job id field
    pub const JOB_ID: &str = "job_id";
    /// Item count field
    pub const ITEM_COUNT: &str = "item_count";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_level_from_str() {
        assert_eq!("error".parse::<TracingLevel>(), Ok(TracingLevel::Error));
        assert_eq!("WARN".parse::<TracingLevel>(), Ok(TracingLevel::Warn));
        assert_eq!("warning".parse::<TracingLevel>(), Ok(TracingLevel::Warn));
        assert_eq!("Info".parse::<TracingLevel>(), Ok(TracingLevel::Info));
        assert_eq!("trace".parse::<TracingLevel>(), Ok(TracingLevel::Trace));
        assert!("loud".parse::<TracingLevel>().is_err());
    }

    #[test]
    fn test_tracing_level_serde_is_lowercase() {
        let json = serde_json::to_string(&TracingLevel::Debug).unwrap();
        assert_eq!(json, "\"debug\"");
        let level: TracingLevel = serde_json::from_str("\"warn\"").unwrap();
        assert_eq!(level, TracingLevel::Warn);
    }

    #[test]
    fn test_raised_by_saturates() {
        assert_eq!(TracingLevel::Info.raised_by(0), TracingLevel::Info);
        assert_eq!(TracingLevel::Info.raised_by(1), TracingLevel::Debug);
        assert_eq!(TracingLevel::Warn.raised_by(9), TracingLevel::Trace);
        assert_eq!(TracingLevel::Trace.raised_by(u8::MAX), TracingLevel::Trace);
    }

    #[test]
    fn test_directive() {
        let config = TracingConfig::new().with_level(TracingLevel::Debug);
        assert!(config.directive().contains("fleetmon_core=debug"));

        let custom = config.with_filter("fleetmon_core=trace,tokio=warn");
        assert_eq!(custom.directive(), "fleetmon_core=trace,tokio=warn");
    }

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::new()
            .with_output(TracingOutput::Stdout)
            .with_thread_ids(true);
        assert_eq!(config.output, TracingOutput::Stdout);
        assert!(config.thread_ids);
        assert_eq!(TracingOutput::default(), TracingOutput::Stderr);
    }
}
