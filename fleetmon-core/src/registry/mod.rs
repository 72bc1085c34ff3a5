//! Fleet registry
//!
//! The single shared mutable structure of the engine: every known host, its
//! session state, its sample history and its recent alerts. The outer map lock is held only to
//! look up or insert entries; all per-host mutation happens under that
//! host's own lock, so work on one host never blocks another. Neither lock
//! is ever held across an `.await`.

mod history;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub use history::{DEFAULT_HISTORY_CAPACITY, HistoryBuffer};

use crate::alert::{Alert, AlertHistory, AlertKind};
use crate::error::{RegistryError, RegistryResult};
use crate::models::{Host, SessionState};
use crate::monitoring::{Sample, SystemInfo};

/// Buffered events per subscriber before old ones are dropped
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Change notifications published by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A host was registered
    HostAdded {
        /// Host address
        address: String,
    },
    /// A host was deleted
    HostRemoved {
        /// Host address
        address: String,
    },
    /// A host changed session state
    StateChanged {
        /// Host address
        address: String,
        /// Previous state
        from: SessionState,
        /// New state
        to: SessionState,
    },
    /// A sample was appended to a host's history
    SampleRecorded {
        /// Host address
        address: String,
    },
    /// A sample crossed an alert threshold
    AlertRaised {
        /// Host address
        address: String,
        /// Metric that crossed
        kind: AlertKind,
    },
}

#[derive(Debug)]
struct HostRecord {
    host: Host,
    history: HistoryBuffer,
    alerts: AlertHistory,
}

/// Point-in-time view of one host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSnapshot {
    /// Host record including state and last error
    pub host: Host,
    /// Most recent sample
    pub latest: Option<Sample>,
    /// Stored samples, oldest first
    pub history: Vec<Sample>,
    /// Recent alerts, oldest first
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

impl HostSnapshot {
    /// Alerts raised by the latest sample
    pub fn current_alerts(&self) -> impl Iterator<Item = &Alert> {
        let latest = self.latest.as_ref().map(|s| s.timestamp);
        self.alerts
            .iter()
            .filter(move |a| Some(a.timestamp) == latest)
    }
}

/// Point-in-time view of the whole fleet
///
/// Each host is internally consistent (read under its own lock); hosts are
/// not mutually atomic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetSnapshot {
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
    /// Hosts sorted by address
    pub hosts: Vec<HostSnapshot>,
}

impl FleetSnapshot {
    /// Looks up one host
    #[must_use]
    pub fn host(&self, address: &str) -> Option<&HostSnapshot> {
        self.hosts.iter().find(|h| h.host.address == address)
    }

    /// Counts per state
    #[must_use]
    pub fn summary(&self) -> FleetSummary {
        self.hosts.iter().map(|h| h.host.state).collect()
    }
}

/// Host counts per session state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetSummary {
    /// All hosts
    pub total: usize,
    /// Never connected
    pub discovered: usize,
    /// First connect in flight
    pub connecting: usize,
    /// Live sessions
    pub connected: usize,
    /// Failed sessions
    pub failed: usize,
    /// Automatic reconnect in flight
    pub reconnecting: usize,
    /// Released on request
    pub disconnected: usize,
}

impl FromIterator<SessionState> for FleetSummary {
    fn from_iter<I: IntoIterator<Item = SessionState>>(iter: I) -> Self {
        let mut summary = Self::default();
        for state in iter {
            summary.total += 1;
            match state {
                SessionState::Discovered => summary.discovered += 1,
                SessionState::Connecting => summary.connecting += 1,
                SessionState::Connected => summary.connected += 1,
                SessionState::Failed => summary.failed += 1,
                SessionState::Reconnecting => summary.reconnecting += 1,
                SessionState::Disconnected => summary.disconnected += 1,
            }
        }
        summary
    }
}

impl fmt::Display for FleetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hosts: {} connected, {} failed, {} reconnecting, {} discovered, {} disconnected",
            self.total,
            self.connected,
            self.failed,
            self.reconnecting + self.connecting,
            self.discovered,
            self.disconnected
        )
    }
}

/// Shared registry of fleet hosts
#[derive(Debug)]
pub struct FleetRegistry {
    hosts: RwLock<HashMap<String, Arc<Mutex<HostRecord>>>>,
    history_capacity: usize,
    events: broadcast::Sender<RegistryEvent>,
}

impl Default for FleetRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl FleetRegistry {
    /// Creates an empty registry keeping `history_capacity` samples per host
    #[must_use]
    pub fn new(history_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            hosts: RwLock::new(HashMap::new()),
            history_capacity,
            events,
        }
    }

    /// Subscribes to change events from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: RegistryEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn record(&self, address: &str) -> RegistryResult<Arc<Mutex<HostRecord>>> {
        self.hosts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
            .ok_or_else(|| RegistryError::HostNotFound(address.to_string()))
    }

    fn lock(record: &Mutex<HostRecord>) -> MutexGuard<'_, HostRecord> {
        record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_host<T>(
        &self,
        address: &str,
        f: impl FnOnce(&mut HostRecord) -> RegistryResult<T>,
    ) -> RegistryResult<T> {
        let record = self.record(address)?;
        let mut guard = Self::lock(&record);
        f(&mut guard)
    }

    /// Registers a host.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateHost`] if the address is known.
    pub fn add(&self, host: Host) -> RegistryResult<()> {
        if self.insert(host.clone()) {
            Ok(())
        } else {
            Err(RegistryError::DuplicateHost(host.address))
        }
    }

    /// Registers a host unless its address is already known.
    ///
    /// Returns true if the host was inserted. Existing records (and their
    /// state) are never overwritten.
    pub fn insert(&self, host: Host) -> bool {
        let address = host.address.clone();
        {
            let mut hosts = self.hosts.write().unwrap_or_else(PoisonError::into_inner);
            if hosts.contains_key(&address) {
                return false;
            }
            hosts.insert(
                address.clone(),
                Arc::new(Mutex::new(HostRecord {
                    host,
                    history: HistoryBuffer::new(self.history_capacity),
                    alerts: AlertHistory::default(),
                })),
            );
        }
        tracing::debug!(host = %address, "Host registered");
        self.publish(RegistryEvent::HostAdded { address });
        true
    }

    /// Deletes a host and its history.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::HostNotFound`] for unknown addresses.
    pub fn remove(&self, address: &str) -> RegistryResult<Host> {
        let record = self
            .hosts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(address)
            .ok_or_else(|| RegistryError::HostNotFound(address.to_string()))?;
        let host = Self::lock(&record).host.clone();
        tracing::debug!(host = %address, "Host removed");
        self.publish(RegistryEvent::HostRemoved {
            address: address.to_string(),
        });
        Ok(host)
    }

    /// Returns true if the address is registered
    #[must_use]
    pub fn contains(&self, address: &str) -> bool {
        self.hosts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(address)
    }

    /// Number of registered hosts
    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if no hosts are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of one host record
    #[must_use]
    pub fn get(&self, address: &str) -> Option<Host> {
        let record = self.record(address).ok()?;
        let host = Self::lock(&record).host.clone();
        Some(host)
    }

    /// Current state of one host
    #[must_use]
    pub fn state(&self, address: &str) -> Option<SessionState> {
        let record = self.record(address).ok()?;
        let state = Self::lock(&record).host.state;
        Some(state)
    }

    fn records(&self) -> Vec<Arc<Mutex<HostRecord>>> {
        self.hosts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Copies of every host, sorted by address
    #[must_use]
    pub fn hosts(&self) -> Vec<Host> {
        let mut hosts: Vec<Host> = self
            .records()
            .iter()
            .map(|r| Self::lock(r).host.clone())
            .collect();
        hosts.sort_by(|a, b| a.address.cmp(&b.address));
        hosts
    }

    /// Addresses of hosts currently in `state`, sorted
    #[must_use]
    pub fn addresses_in_state(&self, state: SessionState) -> Vec<String> {
        let mut addresses: Vec<String> = self
            .records()
            .iter()
            .filter_map(|r| {
                let guard = Self::lock(r);
                (guard.host.state == state).then(|| guard.host.address.clone())
            })
            .collect();
        addresses.sort();
        addresses
    }

    /// Moves a host to `to`, returning the previous state.
    ///
    /// Entering `Connected` stamps `last_seen` and clears `last_error`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidTransition`] if the state machine
    /// forbids the move, or [`RegistryError::HostNotFound`].
    pub fn transition(&self, address: &str, to: SessionState) -> RegistryResult<SessionState> {
        let from = self.with_host(address, |record| {
            let from = record.host.state;
            if !from.can_transition_to(to) {
                return Err(RegistryError::InvalidTransition {
                    address: address.to_string(),
                    from,
                    to,
                });
            }
            record.host.state = to;
            if to == SessionState::Connected {
                record.host.last_seen = Some(Utc::now());
                record.host.last_error = None;
            }
            Ok(from)
        })?;

        tracing::info!(host = %address, from = %from, to = %to, "Session state changed");
        self.publish(RegistryEvent::StateChanged {
            address: address.to_string(),
            from,
            to,
        });
        Ok(from)
    }

    /// Records the most recent error for a host.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::HostNotFound`] for unknown addresses.
    pub fn set_error(&self, address: &str, error: impl fmt::Display) -> RegistryResult<()> {
        let message = error.to_string();
        self.with_host(address, |record| {
            record.host.last_error = Some(message);
            Ok(())
        })
    }

    /// Stores static system facts; a default display name is replaced by
    /// the remote hostname.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::HostNotFound`] for unknown addresses.
    pub fn set_system_info(&self, address: &str, info: SystemInfo) -> RegistryResult<()> {
        self.with_host(address, |record| {
            if record.host.has_default_name() && !info.hostname.is_empty() {
                record.host.name.clone_from(&info.hostname);
            }
            record.host.system_info = Some(info);
            Ok(())
        })
    }

    /// Appends a sample to a connected host's history and stamps
    /// `last_seen`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::NotConnected`] if the host left `Connected`
    /// - [`RegistryError::StaleSample`] if the sample is not newer than the
    ///   latest stored one
    pub fn record_sample(&self, address: &str, sample: Sample) -> RegistryResult<()> {
        self.with_host(address, |record| {
            if record.host.state != SessionState::Connected {
                return Err(RegistryError::NotConnected(address.to_string()));
            }
            let timestamp = sample.timestamp;
            if !record.history.push(sample) {
                return Err(RegistryError::StaleSample(address.to_string()));
            }
            record.host.last_seen = Some(timestamp);
            Ok(())
        })?;
        self.publish(RegistryEvent::SampleRecorded {
            address: address.to_string(),
        });
        Ok(())
    }

    /// Stores alerts raised for a host, keeping the most recent ones.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::HostNotFound`] for unknown addresses.
    pub fn record_alerts(&self, address: &str, alerts: Vec<Alert>) -> RegistryResult<()> {
        let kinds: Vec<AlertKind> = alerts.iter().map(|a| a.kind).collect();
        self.with_host(address, |record| {
            record.alerts.extend(alerts);
            Ok(())
        })?;
        for kind in kinds {
            self.publish(RegistryEvent::AlertRaised {
                address: address.to_string(),
                kind,
            });
        }
        Ok(())
    }

    /// Copy of one host's recent alerts, oldest first
    #[must_use]
    pub fn alerts(&self, address: &str) -> Option<Vec<Alert>> {
        let record = self.record(address).ok()?;
        let alerts = Self::lock(&record).alerts.to_vec();
        Some(alerts)
    }

    /// Drops a host's stored samples and alerts.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::HostNotFound`] for unknown addresses.
    pub fn clear_history(&self, address: &str) -> RegistryResult<()> {
        self.with_host(address, |record| {
            record.history.clear();
            record.alerts.clear();
            Ok(())
        })
    }

    /// Copy of one host's samples, oldest first
    #[must_use]
    pub fn history(&self, address: &str) -> Option<Vec<Sample>> {
        let record = self.record(address).ok()?;
        let samples = Self::lock(&record).history.to_vec();
        Some(samples)
    }

    /// Most recent sample of one host
    #[must_use]
    pub fn latest_sample(&self, address: &str) -> Option<Sample> {
        let record = self.record(address).ok()?;
        let latest = Self::lock(&record).history.latest().cloned();
        latest
    }

    /// Consistent per-host view of the whole fleet
    #[must_use]
    pub fn snapshot(&self) -> FleetSnapshot {
        let mut hosts: Vec<HostSnapshot> = self
            .records()
            .iter()
            .map(|r| {
                let guard = Self::lock(r);
                HostSnapshot {
                    host: guard.host.clone(),
                    latest: guard.history.latest().cloned(),
                    history: guard.history.to_vec(),
                    alerts: guard.alerts.to_vec(),
                }
            })
            .collect();
        hosts.sort_by(|a, b| a.host.address.cmp(&b.host.address));
        FleetSnapshot {
            taken_at: Utc::now(),
            hosts,
        }
    }

    /// Counts per state
    #[must_use]
    pub fn summary(&self) -> FleetSummary {
        self.records().iter().map(|r| Self::lock(r).host.state).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::DiscoveryOrigin;

    fn registry_with(addresses: &[&str]) -> FleetRegistry {
        let registry = FleetRegistry::new(4);
        for address in addresses {
            registry
                .add(Host::new(*address, DiscoveryOrigin::Manual))
                .unwrap();
        }
        registry
    }

    fn connect(registry: &FleetRegistry, address: &str) {
        registry.transition(address, SessionState::Connecting).unwrap();
        registry.transition(address, SessionState::Connected).unwrap();
    }

    #[test]
    fn test_add_rejects_duplicates_and_insert_keeps_existing() {
        let registry = registry_with(&["10.0.0.1"]);
        connect(&registry, "10.0.0.1");

        assert!(matches!(
            registry.add(Host::new("10.0.0.1", DiscoveryOrigin::Manual)),
            Err(RegistryError::DuplicateHost(_))
        ));
        assert!(!registry.insert(Host::new("10.0.0.1", DiscoveryOrigin::Scanned)));
        assert_eq!(registry.state("10.0.0.1"), Some(SessionState::Connected));
    }

    #[test]
    fn test_invalid_transition_is_rejected() {
        let registry = registry_with(&["h"]);
        let err = registry
            .transition("h", SessionState::Connected)
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::InvalidTransition {
                address: "h".into(),
                from: SessionState::Discovered,
                to: SessionState::Connected,
            }
        );
        assert_eq!(registry.state("h"), Some(SessionState::Discovered));
    }

    #[test]
    fn test_connected_clears_error_and_stamps_last_seen() {
        let registry = registry_with(&["h"]);
        registry.set_error("h", "earlier failure").unwrap();
        connect(&registry, "h");

        let host = registry.get("h").unwrap();
        assert!(host.last_error.is_none());
        assert!(host.last_seen.is_some());
    }

    #[test]
    fn test_record_sample_requires_connected_and_newer() {
        let registry = registry_with(&["h"]);
        let sample = Sample::empty();
        assert_eq!(
            registry.record_sample("h", sample.clone()),
            Err(RegistryError::NotConnected("h".into()))
        );

        connect(&registry, "h");
        registry.record_sample("h", sample.clone()).unwrap();
        assert_eq!(
            registry.record_sample("h", sample),
            Err(RegistryError::StaleSample("h".into()))
        );
        assert_eq!(registry.history("h").map(|h| h.len()), Some(1));
    }

    #[test]
    fn test_history_bounded_per_host() {
        let registry = registry_with(&["h"]);
        connect(&registry, "h");
        let base = Utc::now();
        for i in 0..10 {
            registry
                .record_sample("h", Sample::empty_at(base + Duration::seconds(i)))
                .unwrap();
        }
        let history = registry.history("h").unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(
            registry.latest_sample("h").map(|s| s.timestamp),
            Some(base + Duration::seconds(9))
        );
    }

    #[test]
    fn test_set_system_info_renames_default_name_only() {
        let registry = FleetRegistry::default();
        registry
            .add(Host::new("10.0.0.1", DiscoveryOrigin::Scanned))
            .unwrap();
        registry
            .add(Host::new("10.0.0.2", DiscoveryOrigin::Manual).with_name("db"))
            .unwrap();
        let info = SystemInfo {
            hostname: "node-a".into(),
            ..SystemInfo::default()
        };
        registry.set_system_info("10.0.0.1", info.clone()).unwrap();
        registry.set_system_info("10.0.0.2", info).unwrap();

        assert_eq!(registry.get("10.0.0.1").unwrap().name, "node-a");
        assert_eq!(registry.get("10.0.0.2").unwrap().name, "db");
    }

    #[test]
    fn test_snapshot_and_summary() {
        let registry = registry_with(&["b", "a", "c"]);
        connect(&registry, "a");
        registry.transition("c", SessionState::Connecting).unwrap();
        registry.transition("c", SessionState::Failed).unwrap();
        registry.record_sample("a", Sample::empty()).unwrap();

        let snapshot = registry.snapshot();
        let order: Vec<&str> = snapshot
            .hosts
            .iter()
            .map(|h| h.host.address.as_str())
            .collect();
        assert_eq!(order, ["a", "b", "c"]);
        assert!(snapshot.host("a").unwrap().latest.is_some());

        let summary = registry.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.connected, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.discovered, 1);
        assert_eq!(snapshot.summary(), summary);
    }

    #[test]
    fn test_alerts_are_kept_with_the_host_and_cleared_with_history() {
        let registry = registry_with(&["h"]);
        connect(&registry, "h");
        let mut sample = Sample::empty();
        sample.cpu_percent = Some(97.0);
        let alerts = crate::alert::AlertThresholds::default().evaluate("h", &sample);
        registry.record_sample("h", sample).unwrap();
        registry.record_alerts("h", alerts).unwrap();

        let snapshot = registry.snapshot();
        let host = snapshot.host("h").unwrap();
        assert_eq!(host.alerts.len(), 1);
        assert_eq!(host.current_alerts().count(), 1);

        registry.clear_history("h").unwrap();
        assert_eq!(registry.alerts("h").map(|a| a.len()), Some(0));
    }

    #[test]
    fn test_snapshot_serializes_to_json() {
        let registry = registry_with(&["a"]);
        let json = serde_json::to_string(&registry.snapshot()).unwrap();
        assert!(json.contains("\"address\":\"a\""));
        assert!(json.contains("\"state\":\"discovered\""));
    }

    #[tokio::test]
    async fn test_events_report_transitions() {
        let registry = registry_with(&["h"]);
        let mut events = registry.subscribe();
        connect(&registry, "h");

        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::StateChanged {
                address: "h".into(),
                from: SessionState::Discovered,
                to: SessionState::Connecting,
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::StateChanged {
                address: "h".into(),
                from: SessionState::Connecting,
                to: SessionState::Connected,
            }
        );
    }

    #[test]
    fn test_remove() {
        let registry = registry_with(&["h"]);
        assert_eq!(registry.remove("h").unwrap().address, "h");
        assert!(registry.is_empty());
        assert!(matches!(
            registry.remove("h"),
            Err(RegistryError::HostNotFound(_))
        ));
    }
}
