//! Remote sessions: transport seam, SSH implementation, retry policy and
//! the per-host lifecycle manager.

mod manager;
mod retry;
mod ssh;
mod transport;

pub use manager::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_LIVENESS_TIMEOUT, SessionConfig, SessionManager,
};
pub use retry::{RetryConfig, RetryState};
pub use ssh::{SshSession, SshTransport};
pub use transport::{Endpoint, ExecError, RemoteSession, RemoteTransport};
