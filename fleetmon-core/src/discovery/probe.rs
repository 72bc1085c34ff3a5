//! Liveness probe mechanisms

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{ScanError, ScanResult};
use crate::models::DEFAULT_SSH_PORT;

/// Longest SSH identification line we bother reading
const MAX_BANNER_LEN: usize = 255;

/// Result of probing one address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The address answered
    Live {
        /// SSH identification string, when read
        banner: Option<String>,
        /// Time to answer
        latency: Duration,
    },
    /// Not usable as a fleet host: no answer, or (for TCP) the port refused
    NotLive,
    /// The probe itself failed for this address
    Failed(String),
}

/// A way of deciding whether an address is live
#[async_trait]
pub trait Probe: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Checks that the mechanism can run at all on this system.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::ProbeUnavailable`] when it cannot.
    async fn check_available(&self) -> ScanResult<()> {
        Ok(())
    }

    /// Probes one address. Implementations should respect `timeout`; the
    /// caller enforces it as well.
    async fn probe(&self, addr: Ipv4Addr, timeout: Duration) -> ProbeOutcome;
}

/// Probe mechanism selectable from configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMechanism {
    /// TCP connect to the SSH port
    #[default]
    Tcp,
    /// ICMP echo through the system `ping`
    Ping,
}

impl ProbeMechanism {
    /// Builds the probe for this mechanism
    #[must_use]
    pub fn build(self, port: u16, read_banner: bool) -> Arc<dyn Probe> {
        match self {
            Self::Tcp => Arc::new(TcpProbe::new(port).with_banner(read_banner)),
            Self::Ping => Arc::new(PingProbe),
        }
    }
}

/// TCP connect probe, optionally reading the SSH banner
///
/// Live means the SSH port accepted the connection. A refused or reset
/// connect shows the machine is up but has nothing to monitor on that port,
/// so it is reported as [`ProbeOutcome::NotLive`].
#[derive(Debug, Clone)]
pub struct TcpProbe {
    port: u16,
    read_banner: bool,
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(DEFAULT_SSH_PORT)
    }
}

impl TcpProbe {
    /// Probe connecting to `port`
    #[must_use]
    pub const fn new(port: u16) -> Self {
        Self {
            port,
            read_banner: false,
        }
    }

    /// Reads the server identification line after connecting
    #[must_use]
    pub const fn with_banner(mut self, read_banner: bool) -> Self {
        self.read_banner = read_banner;
        self
    }

    async fn banner(stream: TcpStream, limit: Duration) -> Option<String> {
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        match timeout(limit, reader.read_line(&mut line)).await {
            Ok(Ok(n)) if n > 0 => {
                let line = line.trim();
                // Server sends "SSH-protoversion-softwareversion" first
                line.starts_with("SSH-")
                    .then(|| line.chars().take(MAX_BANNER_LEN).collect())
            }
            _ => None,
        }
    }
}

#[async_trait]
impl Probe for TcpProbe {
    fn name(&self) -> &'static str {
        "tcp"
    }

    async fn probe(&self, addr: Ipv4Addr, limit: Duration) -> ProbeOutcome {
        let started = Instant::now();
        let target = SocketAddr::from((addr, self.port));

        match timeout(limit, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => {
                let latency = started.elapsed();
                let banner = if self.read_banner {
                    let remaining = limit.saturating_sub(latency);
                    Self::banner(stream, remaining).await
                } else {
                    None
                };
                ProbeOutcome::Live { banner, latency }
            }
            Ok(Err(e)) => match e.kind() {
                ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::TimedOut
                | ErrorKind::HostUnreachable
                | ErrorKind::NetworkUnreachable => ProbeOutcome::NotLive,
                _ => ProbeOutcome::Failed(e.to_string()),
            },
            Err(_) => ProbeOutcome::NotLive,
        }
    }
}

/// ICMP echo probe using the system `ping` binary
#[derive(Debug, Clone, Copy, Default)]
pub struct PingProbe;

#[async_trait]
impl Probe for PingProbe {
    fn name(&self) -> &'static str {
        "ping"
    }

    async fn check_available(&self) -> ScanResult<()> {
        match Command::new("ping")
            .arg("-c")
            .arg("1")
            .arg("-W")
            .arg("1")
            .arg("127.0.0.1")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => Err(ScanError::ProbeUnavailable(format!(
                "cannot run 'ping': {e}"
            ))),
        }
    }

    async fn probe(&self, addr: Ipv4Addr, limit: Duration) -> ProbeOutcome {
        let started = Instant::now();
        let wait_secs = limit.as_secs().max(1);
        let mut cmd = Command::new("ping");
        cmd.args(["-c", "1", "-n"])
            .arg("-W")
            .arg(wait_secs.to_string())
            .arg(addr.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match timeout(limit, cmd.output()).await {
            Ok(Ok(output)) => match output.status.code() {
                Some(0) => ProbeOutcome::Live {
                    banner: None,
                    latency: started.elapsed(),
                },
                // 1 = no reply
                Some(1) => ProbeOutcome::NotLive,
                _ => ProbeOutcome::Failed(
                    String::from_utf8_lossy(&output.stderr).trim().to_string(),
                ),
            },
            Ok(Err(e)) => ProbeOutcome::Failed(e.to_string()),
            Err(_) => ProbeOutcome::NotLive,
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn test_tcp_probe_reads_ssh_banner() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(b"SSH-2.0-OpenSSH_9.6\r\n")
                .await
                .unwrap();
        });

        let probe = TcpProbe::new(port).with_banner(true);
        let outcome = probe
            .probe(Ipv4Addr::LOCALHOST, Duration::from_secs(2))
            .await;
        assert!(matches!(
            outcome,
            ProbeOutcome::Live { banner: Some(ref b), .. } if b == "SSH-2.0-OpenSSH_9.6"
        ));
    }

    #[tokio::test]
    async fn test_tcp_probe_refused_ssh_port_is_not_live() {
        // Bind then drop to get a port nobody listens on; the loopback host
        // is up but refuses the connection
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let outcome = TcpProbe::new(port)
            .probe(Ipv4Addr::LOCALHOST, Duration::from_secs(1))
            .await;
        assert_eq!(outcome, ProbeOutcome::NotLive);
    }

    #[tokio::test]
    async fn test_tcp_probe_without_banner() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let outcome = TcpProbe::new(port)
            .probe(Ipv4Addr::LOCALHOST, Duration::from_secs(1))
            .await;
        assert!(matches!(outcome, ProbeOutcome::Live { banner: None, .. }));
        drop(listener);
    }

    #[test]
    fn test_mechanism_serde() {
        let m: ProbeMechanism = serde_json::from_str("\"ping\"").unwrap();
        assert_eq!(m, ProbeMechanism::Ping);
        assert_eq!(m.build(22, false).name(), "ping");
        assert_eq!(ProbeMechanism::default().build(22, true).name(), "tcp");
    }
}
