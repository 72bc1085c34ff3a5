//! Multi-host polling through the scripted transport

use std::sync::Arc;
use std::time::{Duration, Instant};

use fleetmon_core::cancel::CancellationToken;
use fleetmon_core::models::{Credentials, DiscoveryOrigin, Host, SessionState};
use fleetmon_core::monitoring::CommandKind;
use fleetmon_core::poller::{HostOutcome, PollConfig, Poller};
use fleetmon_core::registry::FleetRegistry;
use fleetmon_core::session::{RemoteTransport, RetryConfig, SessionConfig, SessionManager};
use fleetmon_core::testing::{MockSession, MockTransport};

const HOSTS: [&str; 3] = ["10.0.0.1", "10.0.0.2", "10.0.0.3"];

async fn connected_fleet(transport: MockTransport, poll: PollConfig) -> (Poller, Arc<FleetRegistry>, Arc<MockTransport>) {
    let registry = Arc::new(FleetRegistry::new(8));
    for address in HOSTS {
        registry
            .add(Host::new(address, DiscoveryOrigin::Scanned))
            .unwrap();
    }
    let transport = Arc::new(transport);
    let shared: Arc<dyn RemoteTransport> = transport.clone();
    let config = SessionConfig {
        retry: RetryConfig::no_retry(),
        ..SessionConfig::default()
    };
    let manager = SessionManager::new(Arc::clone(&registry), shared, config);
    for address in HOSTS {
        manager
            .connect(address, Credentials::with_agent("ops"))
            .await
            .unwrap();
    }
    (Poller::new(manager, poll), registry, transport)
}

fn poll_config() -> PollConfig {
    PollConfig {
        interval: Duration::from_millis(20),
        per_host_timeout: Duration::from_millis(300),
        max_concurrency: 8,
        timeout_threshold: 3,
    }
}

fn stalled_metrics() -> MockSession {
    CommandKind::METRICS_BATCH
        .into_iter()
        .fold(MockSession::healthy(), |session, kind| {
            session.with_delay(kind, Duration::from_secs(3))
        })
}

#[tokio::test]
async fn test_tick_records_one_sample_per_host() {
    let (poller, registry, _) = connected_fleet(MockTransport::new(), poll_config()).await;

    let report = poller.tick().await;

    assert_eq!(report.polled, 3);
    assert_eq!(report.recorded, 3);
    for address in HOSTS {
        let history = registry.history(address).unwrap();
        assert_eq!(history.len(), 1);
        let sample = &history[0];
        assert!((sample.cpu_percent.unwrap() - 25.0).abs() < 0.1);
        assert_eq!(sample.process_count, Some(3));
        assert!(registry.get(address).unwrap().last_seen.is_some());
    }
}

#[tokio::test]
async fn test_broken_session_mid_poll_is_excluded_afterwards() {
    let (poller, registry, transport) = connected_fleet(MockTransport::new(), poll_config()).await;
    poller.tick().await;

    transport.session("10.0.0.2").unwrap().set_broken(true);
    let report = poller.tick().await;

    assert_eq!(report.recorded, 2);
    assert_eq!(report.failed, 1);
    let host = registry.get("10.0.0.2").unwrap();
    assert_eq!(host.state, SessionState::Failed);
    assert!(host.last_error.unwrap().contains("Session broken"));

    let report = poller.tick().await;
    assert_eq!(report.polled, 2);
    assert!(report.hosts.iter().all(|(address, _)| address != "10.0.0.2"));
    assert_eq!(registry.history("10.0.0.1").unwrap().len(), 3);
    assert_eq!(registry.history("10.0.0.2").unwrap().len(), 1);
}

#[tokio::test]
async fn test_slow_host_does_not_delay_the_others() {
    let transport = MockTransport::new().with_host_session("10.0.0.3", stalled_metrics);
    let (poller, registry, _) = connected_fleet(transport, poll_config()).await;

    let started = Instant::now();
    let report = poller.tick().await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(report.recorded, 2);
    assert_eq!(report.timed_out, 1);
    assert_eq!(
        report.hosts,
        [
            ("10.0.0.1".to_string(), HostOutcome::Recorded),
            ("10.0.0.2".to_string(), HostOutcome::Recorded),
            ("10.0.0.3".to_string(), HostOutcome::TimedOut),
        ]
    );
    assert_eq!(registry.state("10.0.0.3"), Some(SessionState::Connected));
    assert!(registry.history("10.0.0.3").unwrap().is_empty());
}

#[tokio::test]
async fn test_repeated_timeouts_fail_the_host() {
    let transport = MockTransport::new().with_host_session("10.0.0.3", stalled_metrics);
    let (poller, registry, _) = connected_fleet(transport, poll_config()).await;

    for _ in 0..2 {
        poller.tick().await;
        assert_eq!(registry.state("10.0.0.3"), Some(SessionState::Connected));
    }
    poller.tick().await;

    let host = registry.get("10.0.0.3").unwrap();
    assert_eq!(host.state, SessionState::Failed);
    assert!(host.last_error.unwrap().contains("consecutive"));
    assert_eq!(poller.tick().await.polled, 2);
}

#[tokio::test]
async fn test_run_stops_when_cancelled() {
    let (poller, registry, _) = connected_fleet(MockTransport::new(), poll_config()).await;
    let cancel = CancellationToken::new();
    let stop = cancel.clone();

    let mut ticks = 0;
    poller
        .run_with(cancel, |report| {
            assert_eq!(report.polled, 3);
            ticks += 1;
            if ticks == 3 {
                stop.cancel();
            }
        })
        .await;

    assert_eq!(ticks, 3);
    assert_eq!(registry.history("10.0.0.1").unwrap().len(), 3);
    assert_eq!(poller.snapshot().summary().connected, 3);
}
