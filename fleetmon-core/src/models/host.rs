//! Fleet host record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::credentials::CredentialRef;
use super::state::SessionState;
use crate::monitoring::SystemInfo;

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// How a host entered the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryOrigin {
    /// Added explicitly by the operator
    #[default]
    Manual,
    /// Found by a network scan
    Scanned,
}

impl std::fmt::Display for DiscoveryOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Scanned => write!(f, "scanned"),
        }
    }
}

/// One monitored host
///
/// The address is the identity: a registry holds at most one `Host` per
/// address. Runtime fields (`state`, `last_seen`, `last_error`,
/// `system_info`) are never persisted; see [`SavedHost`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    /// IP address or resolvable host name
    pub address: String,
    /// Display name
    pub name: String,
    /// SSH port
    pub port: u16,
    /// Who to log in as and how
    pub credentials: CredentialRef,
    /// Manual or scanned
    pub origin: DiscoveryOrigin,
    /// Current session state
    pub state: SessionState,
    /// Last successful contact
    pub last_seen: Option<DateTime<Utc>>,
    /// Most recent error, cleared on successful connect
    pub last_error: Option<String>,
    /// Static facts fetched once after connecting
    pub system_info: Option<SystemInfo>,
}

impl Host {
    /// Creates a host in the `Discovered` state
    #[must_use]
    pub fn new(address: impl Into<String>, origin: DiscoveryOrigin) -> Self {
        let address = address.into();
        Self {
            name: address.clone(),
            address,
            port: DEFAULT_SSH_PORT,
            credentials: CredentialRef::default(),
            origin,
            state: SessionState::Discovered,
            last_seen: None,
            last_error: None,
            system_info: None,
        }
    }

    /// Sets the display name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the SSH port
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the credential reference
    #[must_use]
    pub fn with_credentials(mut self, credentials: CredentialRef) -> Self {
        self.credentials = credentials;
        self
    }

    /// Returns true if the display name was never customised
    #[must_use]
    pub fn has_default_name(&self) -> bool {
        self.name.is_empty() || self.name == self.address
    }
}

/// Persisted form of a [`Host`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedHost {
    /// IP address or host name
    pub address: String,
    /// Display name
    pub name: String,
    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Credential reference (no secrets)
    pub credentials: CredentialRef,
    /// Manual or scanned
    #[serde(default)]
    pub origin: DiscoveryOrigin,
}

const fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

impl From<&Host> for SavedHost {
    fn from(host: &Host) -> Self {
        Self {
            address: host.address.clone(),
            name: host.name.clone(),
            port: host.port,
            credentials: host.credentials.clone(),
            origin: host.origin,
        }
    }
}

impl From<SavedHost> for Host {
    fn from(saved: SavedHost) -> Self {
        Self::new(saved.address, saved.origin)
            .with_name(saved.name)
            .with_port(saved.port)
            .with_credentials(saved.credentials)
    }
}
