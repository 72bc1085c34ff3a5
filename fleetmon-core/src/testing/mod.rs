//! Scripted test doubles for the transport and probe seams.
//!
//! [`MockTransport`] and [`MockProbe`] stand in for SSH and the network so
//! the session manager, poller and scanner can be driven deterministically
//! by tests and by front-ends running in demo mode.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;

use crate::discovery::{Probe, ProbeOutcome};
use crate::error::{ScanError, ScanResult, SessionError, SessionResult};
use crate::models::{CredentialSecret, Credentials};
use crate::monitoring::CommandKind;
use crate::session::{Endpoint, ExecError, RemoteSession, RemoteTransport};

/// Canned command output accepted by the parsers
pub mod fixtures {
    /// Liveness echo
    pub const LIVENESS: &str = "fleetmon-alive\n";

    /// Two `/proc/stat` aggregate lines, 25% busy between them
    pub const CPU: &str = "\
cpu  1000 0 1000 8000 0 0 0 0 0 0
cpu  1100 0 1150 8750 0 0 0 0 0 0
";

    /// `/proc/meminfo` subset, half the memory available
    pub const MEMORY: &str = "\
MemTotal:        8000000 kB
MemFree:         1000000 kB
MemAvailable:    4000000 kB
Buffers:          200000 kB
Cached:          2000000 kB
SwapTotal:       2000000 kB
SwapFree:        2000000 kB
";

    /// `df -Pk /` data line
    pub const DISK: &str = "/dev/sda1 100000000 40000000 60000000 40% /\n";

    /// `/proc/net/dev` without the two header lines
    pub const NETWORK: &str = "\
    lo:  5000 50 0 0 0 0 0 0  5000 50 0 0 0 0 0 0
  eth0: 123456 900 0 0 0 0 0 0  654321 800 0 0 0 0 0 0
";

    /// `/proc/loadavg`
    pub const LOAD: &str = "0.42 0.30 0.25 1/234 5678\n";

    /// `ps -eo pcpu=,pmem=,comm=` with three processes
    pub const PROCESSES: &str = "\
 12.5  3.1 postgres
  4.0  1.2 nginx
  0.3  0.1 sshd
";

    /// Marker-delimited system facts
    pub const SYSTEM_INFO: &str = "\
---FLEETMON_HOSTNAME---
mock-host
---FLEETMON_UNAME---
6.8.0-mock
---FLEETMON_OSRELEASE---
PRETTY_NAME=\"Debian GNU/Linux 12 (bookworm)\"
---FLEETMON_UPTIME---
4242.00 8000.00
---FLEETMON_HWINFO---
MemTotal:        8000000 kB
CPUTHREADS=4
CPUCORES=2
ARCH=x86_64
---FLEETMON_SYSINFO_END---
";
}

/// A remote session answering from a script
#[derive(Debug, Default)]
pub struct MockSession {
    outputs: HashMap<CommandKind, String>,
    errors: HashMap<CommandKind, ExecError>,
    delays: HashMap<CommandKind, Duration>,
    latency: Duration,
    broken: AtomicBool,
    closed: AtomicBool,
    exec_count: AtomicUsize,
}

impl MockSession {
    /// A session with no scripted output; every command fails
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A session answering every command with a valid fixture
    #[must_use]
    pub fn healthy() -> Self {
        Self::new()
            .with_output(CommandKind::Echo, fixtures::LIVENESS)
            .with_output(CommandKind::SystemInfo, fixtures::SYSTEM_INFO)
            .with_output(CommandKind::Cpu, fixtures::CPU)
            .with_output(CommandKind::Memory, fixtures::MEMORY)
            .with_output(CommandKind::Disk, fixtures::DISK)
            .with_output(CommandKind::Network, fixtures::NETWORK)
            .with_output(CommandKind::Load, fixtures::LOAD)
            .with_output(CommandKind::Processes, fixtures::PROCESSES)
    }

    /// Scripts the raw output of `kind`
    #[must_use]
    pub fn with_output(mut self, kind: CommandKind, output: &str) -> Self {
        self.outputs.insert(kind, output.to_string());
        self
    }

    /// Scripts `kind` to fail; takes precedence over output
    #[must_use]
    pub fn with_error(mut self, kind: CommandKind, error: ExecError) -> Self {
        self.errors.insert(kind, error);
        self
    }

    /// Delays `kind` by `delay`
    #[must_use]
    pub fn with_delay(mut self, kind: CommandKind, delay: Duration) -> Self {
        self.delays.insert(kind, delay);
        self
    }

    /// Delays every command by `latency`
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes every later command fail with a broken session
    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    /// Whether `close` was called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of commands executed
    #[must_use]
    pub fn exec_count(&self) -> usize {
        self.exec_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSession for MockSession {
    async fn exec(&self, kind: CommandKind, timeout: Duration) -> Result<String, ExecError> {
        self.exec_count.fetch_add(1, Ordering::SeqCst);
        if self.broken.load(Ordering::SeqCst) || self.is_closed() {
            return Err(ExecError::BrokenSession("mock session broken".into()));
        }

        let delay = self.latency + self.delays.get(&kind).copied().unwrap_or_default();
        if !delay.is_zero() {
            if delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(ExecError::Timeout(timeout));
            }
            tokio::time::sleep(delay).await;
        }

        if self.broken.load(Ordering::SeqCst) {
            return Err(ExecError::BrokenSession("mock session broken".into()));
        }
        if let Some(error) = self.errors.get(&kind) {
            return Err(error.clone());
        }
        self.outputs
            .get(&kind)
            .cloned()
            .ok_or_else(|| ExecError::CommandFailed {
                status: 127,
                stderr: format!("{kind}: command not found"),
            })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

type SessionFactory = Arc<dyn Fn() -> MockSession + Send + Sync>;

#[derive(Clone)]
enum OpenScript {
    Unreachable,
    RequirePassword(String),
}

/// A transport whose connect outcome is scripted per address
///
/// Unscripted addresses accept any credentials and open sessions from the
/// default factory ([`MockSession::healthy`] unless replaced).
pub struct MockTransport {
    scripts: HashMap<String, OpenScript>,
    default_factory: SessionFactory,
    factories: HashMap<String, SessionFactory>,
    open_delay: Duration,
    slow_hosts: HashMap<String, Duration>,
    fail_first: AtomicUsize,
    opens: Arc<AtomicUsize>,
    sessions: Mutex<Vec<(String, Arc<MockSession>)>>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("open_delay", &self.open_delay)
            .field("opens", &self.opens.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Transport where every host is reachable and healthy
    #[must_use]
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            default_factory: Arc::new(MockSession::healthy),
            factories: HashMap::new(),
            open_delay: Duration::ZERO,
            slow_hosts: HashMap::new(),
            fail_first: AtomicUsize::new(0),
            opens: Arc::new(AtomicUsize::new(0)),
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// Connecting to `address` fails as unreachable
    #[must_use]
    pub fn unreachable(mut self, address: &str) -> Self {
        self.scripts
            .insert(address.to_string(), OpenScript::Unreachable);
        self
    }

    /// `address` only accepts password authentication with `password`
    #[must_use]
    pub fn reject_password(mut self, address: &str, password: &str) -> Self {
        self.scripts.insert(
            address.to_string(),
            OpenScript::RequirePassword(password.to_string()),
        );
        self
    }

    /// The first `count` opens fail as unreachable, whatever the address
    #[must_use]
    pub fn fail_first_opens(self, count: usize) -> Self {
        self.fail_first.store(count, Ordering::SeqCst);
        self
    }

    /// Replaces the default session factory
    #[must_use]
    pub fn with_session_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> MockSession + Send + Sync + 'static,
    {
        self.default_factory = Arc::new(factory);
        self
    }

    /// Session factory for one address
    #[must_use]
    pub fn with_host_session<F>(mut self, address: &str, factory: F) -> Self
    where
        F: Fn() -> MockSession + Send + Sync + 'static,
    {
        self.factories
            .insert(address.to_string(), Arc::new(factory));
        self
    }

    /// Delays every open
    #[must_use]
    pub const fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Delays opens to one address
    #[must_use]
    pub fn with_slow_open(mut self, address: &str, delay: Duration) -> Self {
        self.slow_hosts.insert(address.to_string(), delay);
        self
    }

    /// Shared counter of open attempts
    #[must_use]
    pub fn open_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.opens)
    }

    /// Most recent session opened to `address`
    #[must_use]
    pub fn session(&self, address: &str) -> Option<Arc<MockSession>> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|(addr, _)| addr == address)
            .map(|(_, session)| Arc::clone(session))
    }
}

#[async_trait]
impl RemoteTransport for MockTransport {
    async fn open(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
        timeout: Duration,
    ) -> SessionResult<Arc<dyn RemoteSession>> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let delay = self.open_delay
            + self
                .slow_hosts
                .get(&endpoint.address)
                .copied()
                .unwrap_or_default();
        if !delay.is_zero() {
            if delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(SessionError::Timeout(timeout));
            }
            tokio::time::sleep(delay).await;
        }

        let fail = self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(SessionError::Unreachable(format!(
                "{endpoint}: connection refused"
            )));
        }

        match self.scripts.get(&endpoint.address) {
            Some(OpenScript::Unreachable) => {
                return Err(SessionError::Unreachable(format!(
                    "{endpoint}: no route to host"
                )));
            }
            Some(OpenScript::RequirePassword(expected)) => match &credentials.secret {
                CredentialSecret::Password(given) if given.expose_secret() == expected => {}
                _ => {
                    return Err(SessionError::AuthFailed(format!(
                        "{}@{endpoint}: permission denied",
                        credentials.username
                    )));
                }
            },
            None => {}
        }

        let factory = self
            .factories
            .get(&endpoint.address)
            .unwrap_or(&self.default_factory);
        let session = Arc::new(factory());
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((endpoint.address.clone(), Arc::clone(&session)));
        Ok(session)
    }
}

/// A probe answering from a script
#[derive(Debug, Default)]
pub struct MockProbe {
    live: HashSet<Ipv4Addr>,
    failing: HashSet<Ipv4Addr>,
    all_live: bool,
    delay: Duration,
    unavailable: bool,
    probed: AtomicUsize,
}

impl MockProbe {
    /// Probe reporting every address as not live
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `addr` answers
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not an IPv4 address.
    #[must_use]
    pub fn live(mut self, addr: &str) -> Self {
        self.live.insert(parse(addr));
        self
    }

    /// Probing `addr` fails
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not an IPv4 address.
    #[must_use]
    pub fn failing(mut self, addr: &str) -> Self {
        self.failing.insert(parse(addr));
        self
    }

    /// Every address answers
    #[must_use]
    pub const fn all_live(mut self) -> Self {
        self.all_live = true;
        self
    }

    /// Every probe takes `delay`
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The mechanism reports itself unavailable
    #[must_use]
    pub const fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Number of addresses probed so far
    #[must_use]
    pub fn probed(&self) -> usize {
        self.probed.load(Ordering::SeqCst)
    }
}

fn parse(addr: &str) -> Ipv4Addr {
    addr.parse().expect("mock probe address must be IPv4")
}

#[async_trait]
impl Probe for MockProbe {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn check_available(&self) -> ScanResult<()> {
        if self.unavailable {
            Err(ScanError::ProbeUnavailable("mock probe disabled".into()))
        } else {
            Ok(())
        }
    }

    async fn probe(&self, addr: Ipv4Addr, _timeout: Duration) -> ProbeOutcome {
        self.probed.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.contains(&addr) {
            ProbeOutcome::Failed("mock probe failure".into())
        } else if self.all_live || self.live.contains(&addr) {
            ProbeOutcome::Live {
                banner: Some("SSH-2.0-MockSSH".into()),
                latency: self.delay,
            }
        } else {
            ProbeOutcome::NotLive
        }
    }
}
