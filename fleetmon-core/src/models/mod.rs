//! Core data structures: hosts, credentials and session states.

mod credentials;
mod host;
mod state;

pub use credentials::{AuthMethod, CredentialRef, CredentialSecret, Credentials};
pub use host::{DEFAULT_SSH_PORT, DiscoveryOrigin, Host, SavedHost};
pub use state::SessionState;
