//! Session lifecycle through the manager and registry

use std::sync::Arc;
use std::time::Duration;

use fleetmon_core::models::{Credentials, DiscoveryOrigin, Host, SessionState};
use fleetmon_core::registry::{FleetRegistry, RegistryEvent};
use fleetmon_core::session::{RemoteTransport, RetryConfig, SessionConfig, SessionManager};
use fleetmon_core::testing::MockTransport;
use fleetmon_core::SessionError;

fn fleet(transport: MockTransport, retry: RetryConfig, addresses: &[&str]) -> (SessionManager, Arc<FleetRegistry>) {
    let registry = Arc::new(FleetRegistry::new(16));
    for address in addresses {
        registry
            .add(Host::new(*address, DiscoveryOrigin::Manual))
            .unwrap();
    }
    let transport: Arc<dyn RemoteTransport> = Arc::new(transport);
    let config = SessionConfig {
        connect_timeout: Duration::from_millis(500),
        liveness_timeout: Duration::from_millis(200),
        command_timeout: Duration::from_millis(200),
        retry,
        ..SessionConfig::default()
    };
    let manager = SessionManager::new(Arc::clone(&registry), transport, config);
    (manager, registry)
}

fn fast_retry() -> RetryConfig {
    RetryConfig::new()
        .with_max_attempts(Some(5))
        .with_initial_delay_ms(10)
        .with_max_delay_ms(40)
}

async fn wait_for_state(registry: &FleetRegistry, address: &str, state: SessionState) -> bool {
    for _ in 0..100 {
        if registry.state(address) == Some(state) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_wrong_password_is_reported_and_not_retried() {
    let transport = MockTransport::new().reject_password("10.0.0.1", "hunter2");
    let opens = transport.open_count();
    let (manager, registry) = fleet(transport, fast_retry(), &["10.0.0.1"]);

    let err = manager
        .connect("10.0.0.1", Credentials::with_password("ops", "nope".into()))
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::AuthFailed(_)));
    let host = registry.get("10.0.0.1").unwrap();
    assert_eq!(host.state, SessionState::Failed);
    assert!(host.last_error.as_deref().unwrap().contains("permission denied"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(opens.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(!manager.reconnect_pending("10.0.0.1"));
}

#[tokio::test]
async fn test_state_events_follow_the_state_machine() {
    let (manager, registry) = fleet(MockTransport::new(), RetryConfig::no_retry(), &["10.0.0.1"]);
    let mut events = registry.subscribe();

    manager
        .connect("10.0.0.1", Credentials::with_agent("ops"))
        .await
        .unwrap();
    manager.disconnect("10.0.0.1").await;

    let mut path = vec![SessionState::Discovered];
    while let Ok(event) = events.try_recv() {
        if let RegistryEvent::StateChanged { from, to, .. } = event {
            assert!(from.can_transition_to(to), "{from} -> {to}");
            assert_eq!(path.last(), Some(&from));
            path.push(to);
        }
    }

    assert_eq!(
        path,
        [
            SessionState::Discovered,
            SessionState::Connecting,
            SessionState::Connected,
            SessionState::Disconnected,
        ]
    );
}

#[tokio::test]
async fn test_unreachable_host_recovers_through_automatic_reconnect() {
    let transport = MockTransport::new().fail_first_opens(2);
    let opens = transport.open_count();
    let (manager, registry) = fleet(transport, fast_retry(), &["10.0.0.1"]);

    let err = manager
        .connect("10.0.0.1", Credentials::with_agent("ops"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Unreachable(_)));
    assert!(manager.reconnect_pending("10.0.0.1"));

    assert!(wait_for_state(&registry, "10.0.0.1", SessionState::Connected).await);
    assert_eq!(opens.load(std::sync::atomic::Ordering::SeqCst), 3);
    assert!(registry.get("10.0.0.1").unwrap().last_error.is_none());
}

#[tokio::test]
async fn test_one_unreachable_host_does_not_block_others() {
    let transport = MockTransport::new()
        .unreachable("10.0.0.2")
        .with_slow_open("10.0.0.3", Duration::from_secs(5));
    let (manager, registry) = fleet(
        transport,
        RetryConfig::no_retry(),
        &["10.0.0.1", "10.0.0.2", "10.0.0.3"],
    );

    let (a, b, c) = tokio::join!(
        manager.connect("10.0.0.1", Credentials::with_agent("ops")),
        manager.connect("10.0.0.2", Credentials::with_agent("ops")),
        manager.connect("10.0.0.3", Credentials::with_agent("ops")),
    );

    assert!(a.is_ok());
    assert!(matches!(b, Err(SessionError::Unreachable(_))));
    assert!(matches!(c, Err(SessionError::Timeout(_))));

    let summary = registry.summary();
    assert_eq!(summary.connected, 1);
    assert_eq!(summary.failed, 2);
}

#[tokio::test]
async fn test_disconnect_forgets_credentials() {
    let (manager, registry) = fleet(MockTransport::new(), RetryConfig::no_retry(), &["10.0.0.1"]);
    manager
        .connect("10.0.0.1", Credentials::with_agent("ops"))
        .await
        .unwrap();
    manager.disconnect("10.0.0.1").await;

    assert_eq!(registry.state("10.0.0.1"), Some(SessionState::Disconnected));
    assert!(matches!(
        manager.reconnect("10.0.0.1").await,
        Err(SessionError::NotConnected(_))
    ));

    manager
        .connect("10.0.0.1", Credentials::with_agent("ops"))
        .await
        .unwrap();
    assert_eq!(registry.state("10.0.0.1"), Some(SessionState::Connected));
}

#[tokio::test]
async fn test_remove_deletes_host() {
    let transport = MockTransport::new();
    let (manager, registry) = fleet(transport, RetryConfig::no_retry(), &["10.0.0.1"]);
    manager
        .connect("10.0.0.1", Credentials::with_agent("ops"))
        .await
        .unwrap();

    let removed = manager.remove("10.0.0.1").await.unwrap();
    assert_eq!(removed.address, "10.0.0.1");
    assert!(!registry.contains("10.0.0.1"));
    assert!(registry.history("10.0.0.1").is_none());
    assert!(matches!(
        manager.remove("10.0.0.1").await,
        Err(SessionError::UnknownHost(_))
    ));
}
