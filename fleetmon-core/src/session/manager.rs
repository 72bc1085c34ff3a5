//! Session lifecycle for fleet hosts
//!
//! [`SessionManager`] owns at most one live [`RemoteSession`] per host and
//! drives the host's [`SessionState`] in the registry. Connect attempts for
//! one host serialize on that host's async lock, so a second request waits
//! and then observes the first one's session instead of opening another.
//!
//! After a retryable failure a per-host reconnect task moves the host
//! `Failed → Reconnecting` with exponential backoff until it connects, the
//! retry budget runs out, or the host is disconnected.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::Instrument;

use super::retry::{RetryConfig, RetryState};
use super::transport::{Endpoint, RemoteSession, RemoteTransport};
use crate::cancel::CancellationToken;
use crate::error::{SessionError, SessionResult};
use crate::models::{Credentials, Host, SessionState};
use crate::monitoring::{
    CollectError, CommandKind, CommandOutput, MetricCollector, MetricsParser, Sample,
};
use crate::registry::FleetRegistry;
use crate::trace_operation;
use crate::tracing::span_names;

/// Default bound for opening and authenticating a session
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound for the post-connect liveness echo
pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(5);

/// Session tunables
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Bound for opening and authenticating
    pub connect_timeout: Duration,
    /// Bound for the liveness echo after authenticating
    pub liveness_timeout: Duration,
    /// Bound for each remote command
    pub command_timeout: Duration,
    /// Automatic reconnect policy
    pub retry: RetryConfig,
    /// Process entries kept per sample
    pub top_processes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            liveness_timeout: DEFAULT_LIVENESS_TIMEOUT,
            command_timeout: crate::monitoring::DEFAULT_COMMAND_TIMEOUT,
            retry: RetryConfig::default(),
            top_processes: crate::monitoring::DEFAULT_TOP_PROCESSES,
        }
    }
}

struct ReconnectTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Per-host session bookkeeping
#[derive(Default)]
struct HostSlot {
    /// The live session; the lock also serializes connect attempts
    session: tokio::sync::Mutex<Option<Arc<dyn RemoteSession>>>,
    /// Credentials of the last connect request, for reconnects
    credentials: Mutex<Option<Credentials>>,
    reconnect: Mutex<Option<ReconnectTask>>,
}

impl HostSlot {
    fn credentials(&self) -> Option<Credentials> {
        self.credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_credentials(&self, credentials: Option<Credentials>) {
        *self
            .credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = credentials;
    }

    fn cancel_reconnect(&self) {
        if let Some(task) = self
            .reconnect
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.cancel.cancel();
        }
    }

    fn reconnect_pending(&self) -> bool {
        self.reconnect
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished() && !task.cancel.is_cancelled())
    }
}

/// Who started a connect attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// `connect` or `reconnect`; may schedule automatic retries
    Request,
    /// The reconnect task itself
    Automatic,
}

/// Fails the host if a connect attempt is dropped before it resolves
struct PendingAttempt<'a> {
    registry: &'a FleetRegistry,
    address: &'a str,
    armed: bool,
}

impl<'a> PendingAttempt<'a> {
    const fn new(registry: &'a FleetRegistry, address: &'a str) -> Self {
        Self {
            registry,
            address,
            armed: true,
        }
    }

    fn resolve(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingAttempt<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if self
            .registry
            .transition(self.address, SessionState::Failed)
            .is_ok()
        {
            tracing::warn!(host = %self.address, "Connect attempt abandoned");
            let _ = self.registry.set_error(self.address, "Connect attempt abandoned");
        }
    }
}

struct Inner {
    registry: Arc<FleetRegistry>,
    transport: Arc<dyn RemoteTransport>,
    config: SessionConfig,
    collector: MetricCollector,
    slots: Mutex<HashMap<String, Arc<HostSlot>>>,
}

/// Manages remote sessions for every host in a [`FleetRegistry`]
///
/// Cheap to clone; clones share the same sessions.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.inner.config)
            .field("hosts", &self.inner.registry.len())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Creates a manager over `registry` using `transport`
    #[must_use]
    pub fn new(
        registry: Arc<FleetRegistry>,
        transport: Arc<dyn RemoteTransport>,
        config: SessionConfig,
    ) -> Self {
        let collector = MetricCollector::new(
            config.command_timeout,
            MetricsParser::new(config.top_processes),
        );
        Self {
            inner: Arc::new(Inner {
                registry,
                transport,
                config,
                collector,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The registry this manager updates
    #[must_use]
    pub fn registry(&self) -> &Arc<FleetRegistry> {
        &self.inner.registry
    }

    /// Session tunables
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Connects to a registered host.
    ///
    /// On success the host is `Connected`, its system info is recorded and
    /// the credentials are kept in memory for reconnects. On failure the
    /// host is `Failed` with `last_error` set; retryable failures schedule
    /// automatic reconnects, [`SessionError::AuthFailed`] never does.
    /// Dropping the returned future mid-attempt also leaves the host
    /// `Failed`.
    ///
    /// # Errors
    ///
    /// [`SessionError::AuthFailed`], [`SessionError::Unreachable`],
    /// [`SessionError::Timeout`], [`SessionError::BrokenSession`] if the
    /// session died right after opening, or [`SessionError::UnknownHost`].
    pub async fn connect(&self, address: &str, credentials: Credentials) -> SessionResult<()> {
        let slot = self.inner.slot(address)?;
        slot.cancel_reconnect();
        slot.set_credentials(Some(credentials));
        let span = trace_operation!(span_names::SESSION_CONNECT, host = %address);
        self.inner
            .establish(address, &slot, Trigger::Request, None)
            .instrument(span)
            .await
    }

    /// Retries a host with the credentials of its last connect request.
    ///
    /// This is the way out of `Failed` once automatic retries are exhausted.
    ///
    /// # Errors
    ///
    /// As [`connect`](Self::connect); [`SessionError::NotConnected`] if no
    /// credentials were ever supplied for the host.
    pub async fn reconnect(&self, address: &str) -> SessionResult<()> {
        let slot = self.inner.slot(address)?;
        if slot.credentials().is_none() {
            return Err(SessionError::NotConnected(address.to_string()));
        }
        slot.cancel_reconnect();
        let span = trace_operation!(span_names::SESSION_RECONNECT, host = %address);
        self.inner
            .establish(address, &slot, Trigger::Request, None)
            .instrument(span)
            .await
    }

    /// Runs one command on a connected host and parses its output.
    ///
    /// A [`SessionError::BrokenSession`] result has already moved the host
    /// to `Failed`.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotConnected`], [`SessionError::Timeout`],
    /// [`SessionError::BrokenSession`], [`SessionError::ParseError`] or
    /// [`SessionError::CommandFailed`].
    pub async fn execute(&self, address: &str, kind: CommandKind) -> SessionResult<CommandOutput> {
        let session = self.inner.live_session(address).await?;
        match self.inner.collector.execute(session.as_ref(), kind).await {
            Ok(output) => Ok(output),
            Err(e) => Err(self.inner.handle_collect_error(address, &session, e).await),
        }
    }

    /// Collects one metrics sample from a connected host.
    ///
    /// The sample is returned, not stored; see [`crate::poller::Poller`].
    ///
    /// # Errors
    ///
    /// As [`execute`](Self::execute).
    pub async fn collect(&self, address: &str) -> SessionResult<Sample> {
        let session = self.inner.live_session(address).await?;
        match self.inner.collector.collect(session.as_ref()).await {
            Ok(sample) => Ok(sample),
            Err(e) => Err(self.inner.handle_collect_error(address, &session, e).await),
        }
    }

    /// Tears down a host's session after a failure detected elsewhere
    /// (for example repeated poll timeouts) and moves it to `Failed`.
    pub async fn mark_failed(&self, address: &str, error: SessionError) {
        let Ok(slot) = self.inner.slot(address) else {
            return;
        };
        let session = slot.session.lock().await.clone();
        if let Some(session) = session {
            self.inner.fail_session(address, &slot, &session, &error).await;
        } else {
            let _ = self.inner.registry.set_error(address, &error);
        }
    }

    /// Releases a host's session, cancels pending reconnects, drops its
    /// history and marks it `Disconnected`. Idempotent; unknown hosts are
    /// ignored.
    pub async fn disconnect(&self, address: &str) {
        let span = trace_operation!(span_names::SESSION_DISCONNECT, host = %address);
        self.inner.disconnect(address).instrument(span).await;
    }

    /// Disconnects a host and deletes it from the registry.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownHost`] if the host is not registered.
    pub async fn remove(&self, address: &str) -> SessionResult<Host> {
        self.inner.disconnect(address).await;
        let host = self.inner.registry.remove(address)?;
        self.inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(address);
        Ok(host)
    }

    /// Disconnects every host that has a session or a pending reconnect
    pub async fn disconnect_all(&self) {
        let addresses: Vec<String> = self
            .inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        for address in addresses {
            self.inner.disconnect(&address).await;
        }
    }

    /// Returns true if the host has a live session
    pub async fn is_connected(&self, address: &str) -> bool {
        self.inner.live_session(address).await.is_ok()
    }

    /// Returns true if an automatic reconnect task is waiting or running
    #[must_use]
    pub fn reconnect_pending(&self, address: &str) -> bool {
        self.inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .is_some_and(|slot| slot.reconnect_pending())
    }
}

impl Inner {
    fn slot(&self, address: &str) -> SessionResult<Arc<HostSlot>> {
        if !self.registry.contains(address) {
            return Err(SessionError::UnknownHost(address.to_string()));
        }
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(slots.entry(address.to_string()).or_default()))
    }

    async fn live_session(&self, address: &str) -> SessionResult<Arc<dyn RemoteSession>> {
        let slot = self.slot(address)?;
        let session = slot.session.lock().await.clone();
        match (session, self.registry.state(address)) {
            (Some(session), Some(SessionState::Connected)) => Ok(session),
            _ => Err(SessionError::NotConnected(address.to_string())),
        }
    }

    /// One connect attempt under the host's lock
    async fn establish(
        self: &Arc<Self>,
        address: &str,
        slot: &Arc<HostSlot>,
        trigger: Trigger,
        cancel: Option<&CancellationToken>,
    ) -> SessionResult<()> {
        let mut current = slot.session.lock().await;

        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(SessionError::NotConnected(address.to_string()));
        }

        let host = self
            .registry
            .get(address)
            .ok_or_else(|| SessionError::UnknownHost(address.to_string()))?;

        if current.is_some() && host.state == SessionState::Connected {
            tracing::debug!(host = %address, "Already connected");
            return Ok(());
        }
        if let Some(stale) = current.take() {
            stale.close().await;
        }

        let credentials = slot
            .credentials()
            .ok_or_else(|| SessionError::NotConnected(address.to_string()))?;

        let attempting = match host.state {
            SessionState::Discovered | SessionState::Disconnected => SessionState::Connecting,
            SessionState::Failed => SessionState::Reconnecting,
            SessionState::Connected => {
                // Registry says connected but there is no session
                self.registry.transition(address, SessionState::Failed)?;
                SessionState::Reconnecting
            }
            // A previous attempt was abandoned mid-flight
            attempting @ (SessionState::Connecting | SessionState::Reconnecting) => attempting,
        };
        if attempting != host.state {
            self.registry.transition(address, attempting)?;
        }
        let attempt = PendingAttempt::new(&self.registry, address);

        tracing::debug!(host = %address, username = %credentials.username, "Opening session");
        let started = Instant::now();
        let endpoint = Endpoint::new(address, host.port);
        let opened = self.open_verified(&endpoint, &credentials).await;
        attempt.resolve();
        match opened {
            Ok(session) => {
                *current = Some(session);
                self.registry.transition(address, SessionState::Connected)?;
                drop(current);
                tracing::info!(
                    host = %address,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Connected"
                );
                self.fetch_system_info(address, slot).await
            }
            Err(error) => {
                self.registry.transition(address, SessionState::Failed)?;
                self.registry.set_error(address, &error)?;
                drop(current);
                tracing::warn!(
                    host = %address,
                    error = %error,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Connect failed"
                );
                if trigger == Trigger::Request {
                    self.schedule_reconnect(address, slot, &error);
                }
                Err(error)
            }
        }
    }

    /// Opens a session and verifies it with the liveness echo
    async fn open_verified(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> SessionResult<Arc<dyn RemoteSession>> {
        let timeout = self.config.connect_timeout;
        let session = tokio::time::timeout(
            timeout,
            self.transport.open(endpoint, credentials, timeout),
        )
        .await
        .map_err(|_| SessionError::Timeout(timeout))??;

        let liveness = self.config.liveness_timeout;
        let verified = match tokio::time::timeout(
            liveness,
            session.exec(CommandKind::Echo, liveness),
        )
        .await
        {
            Ok(Ok(output)) => MetricsParser::default()
                .parse(CommandKind::Echo, &output)
                .map(|_| ())
                .map_err(|e| SessionError::ParseError(e.to_string())),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(SessionError::Timeout(liveness)),
        };

        match verified {
            Ok(()) => Ok(session),
            Err(e) => {
                session.close().await;
                Err(e)
            }
        }
    }

    /// Best effort, except that a broken session fails the host like any
    /// command and is returned to the caller
    async fn fetch_system_info(
        self: &Arc<Self>,
        address: &str,
        slot: &Arc<HostSlot>,
    ) -> SessionResult<()> {
        let Some(session) = slot.session.lock().await.clone() else {
            return Ok(());
        };
        match self
            .collector
            .execute(session.as_ref(), CommandKind::SystemInfo)
            .await
        {
            Ok(CommandOutput::SystemInfo(info)) => {
                tracing::debug!(
                    host = %address,
                    hostname = %info.hostname,
                    distro = %info.distro_name,
                    "System info collected"
                );
                let _ = self.registry.set_system_info(address, info);
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) if e.is_broken_session() => {
                let error = SessionError::from(e);
                self.fail_session(address, slot, &session, &error).await;
                Err(error)
            }
            Err(e) => {
                tracing::debug!(host = %address, error = %e, "System info unavailable");
                Ok(())
            }
        }
    }

    async fn handle_collect_error(
        self: &Arc<Self>,
        address: &str,
        session: &Arc<dyn RemoteSession>,
        error: CollectError,
    ) -> SessionError {
        let error = SessionError::from(error);
        if error.is_broken_session() {
            if let Ok(slot) = self.slot(address) {
                self.fail_session(address, &slot, session, &error).await;
            }
        } else {
            let _ = self.registry.set_error(address, &error);
        }
        error
    }

    /// Drops `session` if it is still the host's live session and moves the
    /// host to `Failed`. Errors from an already replaced session are only
    /// recorded.
    async fn fail_session(
        self: &Arc<Self>,
        address: &str,
        slot: &Arc<HostSlot>,
        session: &Arc<dyn RemoteSession>,
        error: &SessionError,
    ) {
        let released = {
            let mut current = slot.session.lock().await;
            match current.as_ref() {
                Some(live) if Arc::ptr_eq(live, session) => current.take(),
                _ => None,
            }
        };

        let _ = self.registry.set_error(address, error);
        let Some(released) = released else {
            return;
        };
        released.close().await;

        if self.registry.state(address) == Some(SessionState::Connected) {
            tracing::warn!(host = %address, error = %error, "Session lost");
            let _ = self.registry.transition(address, SessionState::Failed);
            self.schedule_reconnect(address, slot, error);
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, address: &str, slot: &Arc<HostSlot>, error: &SessionError) {
        if !error.is_retryable() || !self.config.retry.should_retry(0) {
            return;
        }

        let mut pending = slot.reconnect.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = pending.as_ref()
            && !task.handle.is_finished()
            && !task.cancel.is_cancelled()
        {
            return;
        }

        let cancel = CancellationToken::new();
        let span = trace_operation!(span_names::SESSION_RECONNECT, host = %address);
        let handle = tokio::spawn(
            Arc::clone(self)
                .reconnect_loop(address.to_string(), Arc::clone(slot), cancel.clone())
                .instrument(span),
        );
        *pending = Some(ReconnectTask { cancel, handle });
    }

    async fn reconnect_loop(
        self: Arc<Self>,
        address: String,
        slot: Arc<HostSlot>,
        cancel: CancellationToken,
    ) {
        let mut retry = RetryState::new(self.config.retry.clone());

        loop {
            let Some(delay) = retry.next_delay() else {
                tracing::warn!(
                    host = %address,
                    attempts = retry.current_attempt(),
                    last_error = retry.last_error().unwrap_or_default(),
                    "Reconnect attempts exhausted"
                );
                return;
            };

            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }

            tracing::info!(
                host = %address,
                attempt = retry.attempt_number(),
                delay_ms = delay.as_millis() as u64,
                "Reconnecting"
            );

            match self
                .establish(&address, &slot, Trigger::Automatic, Some(&cancel))
                .await
            {
                Ok(()) => return,
                Err(e) if cancel.is_cancelled() || !e.is_retryable() => return,
                Err(e) => {
                    retry.record_failure(e.to_string());
                }
            }
        }
    }

    async fn disconnect(&self, address: &str) {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned();

        if let Some(slot) = &slot {
            slot.cancel_reconnect();
            let released = slot.session.lock().await.take();
            if let Some(session) = released {
                session.close().await;
            }
            slot.set_credentials(None);
        }

        if let Some(state) = self.registry.state(address) {
            if state != SessionState::Disconnected {
                let _ = self.registry.transition(address, SessionState::Disconnected);
            }
            let _ = self.registry.clear_history(address);
        }
    }
}
