//! Transport seam between the session manager and the remote shell
//!
//! [`RemoteTransport`] opens authenticated sessions; [`RemoteSession`] runs
//! one of the fixed [`CommandKind`]s over an open session. The production
//! implementation is [`super::SshTransport`]; tests use the scripted doubles
//! in [`crate::testing`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::{SessionError, SessionResult};
use crate::models::Credentials;
use crate::monitoring::CommandKind;

/// Errors from running one command over an open session
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecError {
    /// The command did not finish in time
    #[error("Command timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The channel is gone; the session must be re-established
    #[error("Session broken: {0}")]
    BrokenSession(String),

    /// The command ran and exited non-zero
    #[error("Command exited with status {status}: {stderr}")]
    CommandFailed {
        /// Remote exit status
        status: i32,
        /// Trimmed standard error
        stderr: String,
    },
}

impl From<ExecError> for SessionError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Timeout(after) => Self::Timeout(after),
            ExecError::BrokenSession(reason) => Self::BrokenSession(reason),
            failed @ ExecError::CommandFailed { .. } => Self::CommandFailed(failed.to_string()),
        }
    }
}

/// Where to connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// IP address or host name
    pub address: String,
    /// SSH port
    pub port: u16,
}

impl Endpoint {
    /// Creates an endpoint
    #[must_use]
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Opens authenticated remote sessions
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Connects and authenticates within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Unreachable`], [`SessionError::AuthFailed`]
    /// or [`SessionError::Timeout`] when the session cannot be established.
    async fn open(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
        timeout: Duration,
    ) -> SessionResult<Arc<dyn RemoteSession>>;
}

/// One authenticated channel to a host
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Runs `kind` and returns its standard output.
    ///
    /// # Errors
    ///
    /// See [`ExecError`].
    async fn exec(&self, kind: CommandKind, timeout: Duration) -> Result<String, ExecError>;

    /// Releases the channel. Calling it twice is harmless.
    async fn close(&self);
}
