//! OpenSSH transport
//!
//! Sessions are backed by the system `ssh` client (or `sshpass -e ssh` for
//! password authentication). Connecting starts a `ControlMaster` in the
//! background; each command is multiplexed over its control socket, so
//! authentication happens once per session. Closing sends `ssh -O exit`.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tokio::process::Command;

use super::transport::{Endpoint, ExecError, RemoteSession, RemoteTransport};
use crate::error::{SessionError, SessionResult};
use crate::models::{CredentialSecret, Credentials};
use crate::monitoring::CommandKind;

/// Exit status ssh uses for its own (non-remote) failures
const SSH_ERROR_STATUS: i32 = 255;

/// sshpass exit status for a rejected password
const SSHPASS_BAD_PASSWORD: i32 = 5;

/// sshpass exit status for an unknown host key
const SSHPASS_HOST_KEY_UNKNOWN: i32 = 6;

/// How long to wait for `ssh -O exit`
const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Production [`RemoteTransport`] using the OpenSSH client
#[derive(Debug, Clone)]
pub struct SshTransport {
    control_dir: PathBuf,
    host_key_policy: String,
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl SshTransport {
    /// Creates a transport placing control sockets under `control_dir`.
    ///
    /// Unix socket paths are limited to ~100 bytes, so keep it short.
    #[must_use]
    pub fn new(control_dir: impl Into<PathBuf>) -> Self {
        Self {
            control_dir: control_dir.into(),
            host_key_policy: "accept-new".to_string(),
        }
    }

    /// Overrides `StrictHostKeyChecking` (default `accept-new`)
    #[must_use]
    pub fn with_host_key_policy(mut self, policy: impl Into<String>) -> Self {
        self.host_key_policy = policy.into();
        self
    }

    /// Returns true if `program -V` can be spawned
    async fn binary_available(program: &str) -> bool {
        Command::new(program)
            .arg("-V")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .is_ok()
    }

    fn control_path(&self) -> PathBuf {
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.control_dir.join(format!("fm-{}", &id[..12]))
    }

    fn master_command(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
        control_path: &Path,
        timeout: Duration,
    ) -> Command {
        let mut cmd = match &credentials.secret {
            CredentialSecret::Password(password) => {
                // sshpass reads the password from SSHPASS with -e
                let mut cmd = Command::new("sshpass");
                cmd.arg("-e").arg("ssh");
                cmd.env("SSHPASS", password.expose_secret());
                cmd.args(["-o", "PubkeyAuthentication=no"]);
                cmd.args(["-o", "PreferredAuthentications=password,keyboard-interactive"]);
                cmd.args(["-o", "NumberOfPasswordPrompts=1"]);
                cmd
            }
            CredentialSecret::KeyFile(path) => {
                let mut cmd = Command::new("ssh");
                cmd.args(["-o", "BatchMode=yes", "-o", "IdentitiesOnly=yes"]);
                cmd.arg("-i").arg(path);
                cmd
            }
            CredentialSecret::Agent => {
                let mut cmd = Command::new("ssh");
                cmd.args(["-o", "BatchMode=yes"]);
                cmd
            }
        };

        let connect_secs = timeout.as_secs().max(1);
        cmd.arg("-M").arg("-N").arg("-f");
        cmd.arg("-o").arg("ControlMaster=yes");
        cmd.arg("-o")
            .arg(format!("ControlPath={}", control_path.display()));
        cmd.args(["-o", "ControlPersist=yes"]);
        cmd.arg("-o")
            .arg(format!("StrictHostKeyChecking={}", self.host_key_policy));
        cmd.arg("-o").arg(format!("ConnectTimeout={connect_secs}"));
        cmd.args(["-o", "ServerAliveInterval=15", "-o", "ServerAliveCountMax=3"]);
        cmd.arg("-p").arg(endpoint.port.to_string());
        cmd.arg(format!("{}@{}", credentials.username, endpoint.address));

        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl RemoteTransport for SshTransport {
    async fn open(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
        timeout: Duration,
    ) -> SessionResult<Arc<dyn RemoteSession>> {
        let uses_sshpass = matches!(credentials.secret, CredentialSecret::Password(_));
        let program = if uses_sshpass { "sshpass" } else { "ssh" };
        if !Self::binary_available(program).await {
            return Err(SessionError::TransportUnavailable(format!(
                "'{program}' not found in PATH"
            )));
        }

        let control_path = self.control_path();
        let mut cmd = self.master_command(endpoint, credentials, &control_path, timeout);

        tracing::debug!(
            host = %endpoint,
            user = %credentials.username,
            control_path = %control_path.display(),
            "Starting SSH control master"
        );

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(SessionError::TransportUnavailable(format!(
                    "failed to spawn {program}: {e}"
                )));
            }
            Err(_) => return Err(SessionError::Timeout(timeout)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_connect_failure(
                output.status.code(),
                &stderr,
                uses_sshpass,
                timeout,
            ));
        }

        Ok(Arc::new(SshSession {
            destination: format!("{}@{}", credentials.username, endpoint.address),
            port: endpoint.port,
            control_path,
            closed: AtomicBool::new(false),
        }))
    }
}

/// Maps a failed master start to the session error taxonomy
fn classify_connect_failure(
    code: Option<i32>,
    stderr: &str,
    uses_sshpass: bool,
    timeout: Duration,
) -> SessionError {
    let message = stderr.trim().to_string();
    let lower = message.to_lowercase();

    if uses_sshpass && code == Some(SSHPASS_BAD_PASSWORD) {
        return SessionError::AuthFailed("password rejected".to_string());
    }
    if uses_sshpass && code == Some(SSHPASS_HOST_KEY_UNKNOWN) {
        return SessionError::AuthFailed("host key not accepted".to_string());
    }
    if lower.contains("permission denied")
        || lower.contains("authentication failed")
        || lower.contains("too many authentication failures")
        || lower.contains("host key verification failed")
    {
        return SessionError::AuthFailed(message);
    }
    if lower.contains("timed out") {
        return SessionError::Timeout(timeout);
    }
    if message.is_empty() {
        return SessionError::Unreachable(format!(
            "ssh exited with status {}",
            code.map_or_else(|| "signal".to_string(), |c| c.to_string())
        ));
    }
    // refused, no route, name resolution and anything else ssh reports
    SessionError::Unreachable(message)
}

/// One multiplexed OpenSSH session
#[derive(Debug)]
pub struct SshSession {
    destination: String,
    port: u16,
    control_path: PathBuf,
    closed: AtomicBool,
}

impl SshSession {
    fn client(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-S").arg(&self.control_path);
        cmd.args(["-o", "ControlMaster=no", "-o", "BatchMode=yes"]);
        cmd.arg("-p").arg(self.port.to_string());
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn interpret(output: Output) -> Result<String, ExecError> {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        match output.status.code() {
            Some(0) => String::from_utf8(output.stdout)
                .map_err(|e| ExecError::BrokenSession(format!("invalid UTF-8 in output: {e}"))),
            Some(SSH_ERROR_STATUS) => Err(ExecError::BrokenSession(if stderr.is_empty() {
                "ssh exited with status 255".to_string()
            } else {
                stderr
            })),
            Some(status) => Err(ExecError::CommandFailed { status, stderr }),
            None => Err(ExecError::BrokenSession(
                "ssh terminated by signal".to_string(),
            )),
        }
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn exec(&self, kind: CommandKind, timeout: Duration) -> Result<String, ExecError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ExecError::BrokenSession("session closed".to_string()));
        }

        let mut cmd = self.client();
        cmd.arg(&self.destination).arg(kind.command());

        match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => Self::interpret(output),
            Ok(Err(e)) => Err(ExecError::BrokenSession(format!(
                "failed to spawn ssh: {e}"
            ))),
            // kill_on_drop reaps the child
            Err(_) => Err(ExecError::Timeout(timeout)),
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut cmd = self.client();
        cmd.args(["-O", "exit"]).arg(&self.destination);
        match tokio::time::timeout(CLOSE_TIMEOUT, cmd.output()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "ssh -O exit failed to spawn"),
            Err(_) => tracing::debug!(
                destination = %self.destination,
                "ssh -O exit timed out"
            ),
        }
        // The master normally removes its socket; clean up if it died
        let _ = tokio::fs::remove_file(&self.control_path).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_secs(5);

    #[test]
    fn test_classify_permission_denied() {
        let err = classify_connect_failure(
            Some(255),
            "admin@10.0.0.1: Permission denied (publickey,password).\n",
            false,
            T,
        );
        assert!(matches!(err, SessionError::AuthFailed(_)));
    }

    #[test]
    fn test_classify_sshpass_bad_password() {
        let err = classify_connect_failure(Some(SSHPASS_BAD_PASSWORD), "", true, T);
        assert_eq!(
            err,
            SessionError::AuthFailed("password rejected".to_string())
        );
        // Exit 5 from plain ssh means nothing special
        let err = classify_connect_failure(Some(5), "", false, T);
        assert!(matches!(err, SessionError::Unreachable(_)));
    }

    #[test]
    fn test_classify_unreachable() {
        for stderr in [
            "ssh: connect to host 10.0.0.9 port 22: Connection refused",
            "ssh: connect to host 10.0.0.9 port 22: No route to host",
            "ssh: Could not resolve hostname nope: Name or service not known",
        ] {
            let err = classify_connect_failure(Some(255), stderr, false, T);
            assert!(matches!(err, SessionError::Unreachable(_)), "{stderr}");
        }
    }

    #[test]
    fn test_classify_timeout() {
        let err = classify_connect_failure(
            Some(255),
            "ssh: connect to host 10.0.0.9 port 22: Connection timed out",
            false,
            T,
        );
        assert_eq!(err, SessionError::Timeout(T));
    }

    #[test]
    fn test_control_paths_are_unique_and_short() {
        let transport = SshTransport::new("/tmp");
        let a = transport.control_path();
        let b = transport.control_path();
        assert_ne!(a, b);
        assert!(a.as_os_str().len() < 40);
    }

    #[test]
    fn test_master_command_never_carries_password_in_args() {
        let transport = SshTransport::default();
        let creds = Credentials::with_password("ops", secrecy::SecretString::from("hunter2"));
        let cmd = transport.master_command(
            &Endpoint::new("10.0.0.1", 22),
            &creds,
            Path::new("/tmp/fm-test"),
            T,
        );
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(!args.iter().any(|a| a.contains("hunter2")));
        assert!(args.contains(&"ops@10.0.0.1".to_string()));
        assert_eq!(cmd.as_std().get_program(), "sshpass");
    }
}
