//! Periodic metric polling
//!
//! Each tick takes the set of `Connected` hosts at that moment, collects a
//! sample from each through a bounded pool and records it in the registry.
//! Every host gets its own timeout, so a slow or hung host delays only its
//! own entry. Ticks never overlap: a tick that overruns the interval pushes
//! the next one back. Recorded samples are checked against the alert
//! thresholds.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use crate::alert::{Alert, AlertThresholds};
use crate::cancel::CancellationToken;
use crate::error::{RegistryError, SessionError};
use crate::models::SessionState;
use crate::registry::FleetSnapshot;
use crate::session::SessionManager;
use crate::tracing::span_names;
use crate::trace_operation_debug;

/// Default time between ticks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default bound for one host's collection
pub const DEFAULT_PER_HOST_TIMEOUT: Duration = Duration::from_secs(8);

/// Default hosts collected at once
pub const DEFAULT_POLL_CONCURRENCY: usize = 16;

/// Default consecutive timeouts before a session is considered broken
pub const DEFAULT_TIMEOUT_THRESHOLD: u32 = 3;

/// Poller tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Time between tick starts
    pub interval: Duration,
    /// Bound for one host's collection, independent of `interval`
    pub per_host_timeout: Duration,
    /// Hosts collected at once
    pub max_concurrency: usize,
    /// Consecutive timeouts after which the host's session is dropped
    pub timeout_threshold: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            per_host_timeout: DEFAULT_PER_HOST_TIMEOUT,
            max_concurrency: DEFAULT_POLL_CONCURRENCY,
            timeout_threshold: DEFAULT_TIMEOUT_THRESHOLD,
        }
    }
}

/// What happened to one host during a tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum HostOutcome {
    /// A sample was recorded
    Recorded,
    /// The host's collection exceeded the per-host timeout
    TimedOut,
    /// Collection failed; the host's `last_error` holds the message
    Failed(String),
    /// The host left `Connected` before its turn
    Skipped,
}

/// Summary of one tick
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    /// Hosts that were `Connected` when the tick started
    pub polled: usize,
    /// Samples recorded
    pub recorded: usize,
    /// Hosts that exceeded the per-host timeout
    pub timed_out: usize,
    /// Hosts whose collection failed
    pub failed: usize,
    /// Alerts raised by the recorded samples
    pub alerts: usize,
    /// Per-host outcome, sorted by address
    pub hosts: Vec<(String, HostOutcome)>,
    /// Wall-clock time of the tick
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Drives periodic collection over a [`SessionManager`]'s registry
#[derive(Debug)]
pub struct Poller {
    manager: SessionManager,
    config: PollConfig,
    alerts: Option<AlertThresholds>,
    timeouts: Mutex<HashMap<String, u32>>,
}

impl Poller {
    /// Creates a poller alerting on the default thresholds
    #[must_use]
    pub fn new(manager: SessionManager, config: PollConfig) -> Self {
        Self {
            manager,
            config,
            alerts: Some(AlertThresholds::default()),
            timeouts: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the alert thresholds; `None` turns alerting off
    #[must_use]
    pub fn with_alerts(mut self, thresholds: Option<AlertThresholds>) -> Self {
        self.alerts = thresholds;
        self
    }

    /// Poller tunables
    #[must_use]
    pub const fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Per-host snapshot of the fleet
    #[must_use]
    pub fn snapshot(&self) -> FleetSnapshot {
        self.manager.registry().snapshot()
    }

    /// Polls until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        self.run_with(cancel, |_| {}).await;
    }

    /// Polls until `cancel` fires, handing every tick's report to `on_tick`
    pub async fn run_with<F>(&self, cancel: CancellationToken, mut on_tick: F)
    where
        F: FnMut(&TickReport),
    {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_ms = self.config.interval.as_millis() as u64,
            per_host_timeout_ms = self.config.per_host_timeout.as_millis() as u64,
            "Poller started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let report = tokio::select! {
                () = cancel.cancelled() => break,
                report = self.tick() => report,
            };
            on_tick(&report);
        }

        tracing::info!("Poller stopped");
    }

    /// Runs one collection cycle over the hosts connected right now
    pub async fn tick(&self) -> TickReport {
        let started = Instant::now();
        let registry = self.manager.registry();
        let addresses = registry.addresses_in_state(SessionState::Connected);
        self.forget_departed(&addresses);

        let span = trace_operation_debug!(span_names::POLL_TICK, item_count = addresses.len());
        let polled: Vec<(String, HostOutcome, usize)> = stream::iter(addresses)
            .map(|address| async move {
                let (outcome, alerts) = self.poll_host(&address).await;
                (address, outcome, alerts)
            })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .instrument(span)
            .await;

        let mut report = TickReport {
            polled: polled.len(),
            alerts: polled.iter().map(|(_, _, alerts)| alerts).sum(),
            elapsed: started.elapsed(),
            ..TickReport::default()
        };
        let mut hosts: Vec<(String, HostOutcome)> = polled
            .into_iter()
            .map(|(address, outcome, _)| (address, outcome))
            .collect();
        hosts.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, outcome) in &hosts {
            match outcome {
                HostOutcome::Recorded => report.recorded += 1,
                HostOutcome::TimedOut => report.timed_out += 1,
                HostOutcome::Failed(_) => report.failed += 1,
                HostOutcome::Skipped => {}
            }
        }
        report.hosts = hosts;

        tracing::info!(
            polled = report.polled,
            recorded = report.recorded,
            timed_out = report.timed_out,
            failed = report.failed,
            alerts = report.alerts,
            duration_ms = report.elapsed.as_millis() as u64,
            "Poll tick complete"
        );
        report
    }

    /// Collects and records one host; returns the outcome and the number
    /// of alerts raised
    async fn poll_host(&self, address: &str) -> (HostOutcome, usize) {
        let span = trace_operation_debug!(span_names::POLL_COLLECT, host = %address);
        let limit = self.config.per_host_timeout;

        let result = tokio::time::timeout(limit, self.manager.collect(address))
            .instrument(span)
            .await;

        let outcome = match result {
            Ok(Ok(sample)) => {
                self.reset_timeouts(address);
                let alerts = self
                    .alerts
                    .map(|thresholds| thresholds.evaluate(address, &sample))
                    .unwrap_or_default();
                match self.manager.registry().record_sample(address, sample) {
                    Ok(()) => return (HostOutcome::Recorded, self.raise(address, alerts)),
                    // Disconnected while collecting
                    Err(RegistryError::NotConnected(_) | RegistryError::HostNotFound(_)) => {
                        HostOutcome::Skipped
                    }
                    Err(e) => {
                        tracing::warn!(host = %address, error = %e, "Sample rejected");
                        HostOutcome::Failed(e.to_string())
                    }
                }
            }
            Ok(Err(SessionError::NotConnected(_) | SessionError::UnknownHost(_))) => {
                HostOutcome::Skipped
            }
            Ok(Err(SessionError::Timeout(_))) | Err(_) => {
                self.record_timeout(address, limit).await;
                HostOutcome::TimedOut
            }
            Ok(Err(e)) => {
                if !e.is_broken_session() {
                    self.reset_timeouts(address);
                }
                tracing::warn!(host = %address, error = %e, "Collection failed");
                HostOutcome::Failed(e.to_string())
            }
        };
        (outcome, 0)
    }

    fn raise(&self, address: &str, alerts: Vec<Alert>) -> usize {
        if alerts.is_empty() {
            return 0;
        }
        for alert in &alerts {
            tracing::warn!(
                host = %address,
                alert = %alert.kind,
                value = f64::from(alert.value),
                threshold = f64::from(alert.threshold),
                "{}",
                alert.message()
            );
        }
        let count = alerts.len();
        let _ = self.manager.registry().record_alerts(address, alerts);
        count
    }

    async fn record_timeout(&self, address: &str, limit: Duration) {
        let count = {
            let mut timeouts = self
                .timeouts
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let count = timeouts.entry(address.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let error = SessionError::Timeout(limit);
        tracing::warn!(host = %address, error = %error, consecutive = count, "Collection timed out");

        if count >= self.config.timeout_threshold.max(1) {
            self.reset_timeouts(address);
            self.manager
                .mark_failed(
                    address,
                    SessionError::BrokenSession(format!("{count} consecutive collection timeouts")),
                )
                .await;
        } else {
            let _ = self.manager.registry().set_error(address, &error);
        }
    }

    fn reset_timeouts(&self, address: &str) {
        self.timeouts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(address);
    }

    fn forget_departed(&self, connected: &[String]) {
        self.timeouts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|address, _| connected.contains(address));
    }
}
