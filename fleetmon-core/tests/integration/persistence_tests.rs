//! Saving and restoring the fleet

use std::sync::Arc;

use fleetmon_core::config::{ConfigManager, FleetSettings};
use fleetmon_core::models::{
    AuthMethod, CredentialRef, Credentials, DiscoveryOrigin, Host, SessionState,
};
use fleetmon_core::registry::FleetRegistry;
use fleetmon_core::session::{RemoteTransport, RetryConfig, SessionConfig, SessionManager};
use fleetmon_core::testing::MockTransport;
use tempfile::TempDir;

fn mixed_hosts() -> Vec<Host> {
    vec![
        Host::new("10.0.0.1", DiscoveryOrigin::Manual)
            .with_name("db")
            .with_credentials(CredentialRef::key_file("ops", "~/.ssh/id_ed25519")),
        Host::new("10.0.0.2", DiscoveryOrigin::Scanned)
            .with_credentials(CredentialRef::password("admin")),
        Host::new("web.internal", DiscoveryOrigin::Manual)
            .with_port(2222)
            .with_credentials(CredentialRef::agent("deploy")),
    ]
}

#[test]
fn test_three_hosts_round_trip() {
    let dir = TempDir::new().unwrap();
    let config = ConfigManager::with_config_dir(dir.path());

    config.save_hosts(&mixed_hosts()).unwrap();
    let loaded = config.load_hosts().unwrap();

    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded, mixed_hosts());
    assert_eq!(loaded[1].origin, DiscoveryOrigin::Scanned);
    assert!(matches!(
        &loaded[0].credentials.auth,
        AuthMethod::KeyFile { path } if path.to_str() == Some("~/.ssh/id_ed25519")
    ));
    assert_eq!(loaded[2].port, 2222);
}

#[tokio::test]
async fn test_saving_a_live_fleet_persists_no_runtime_state() {
    let dir = TempDir::new().unwrap();
    let config = ConfigManager::with_config_dir(dir.path());

    let registry = Arc::new(FleetRegistry::new(8));
    for host in mixed_hosts() {
        registry.add(host).unwrap();
    }
    let transport: Arc<dyn RemoteTransport> =
        Arc::new(MockTransport::new().reject_password("10.0.0.2", "s3cret-pw"));
    let manager = SessionManager::new(
        Arc::clone(&registry),
        transport,
        SessionConfig {
            retry: RetryConfig::no_retry(),
            ..SessionConfig::default()
        },
    );
    manager
        .connect("10.0.0.1", Credentials::with_agent("ops"))
        .await
        .unwrap();
    manager
        .connect("10.0.0.2", Credentials::with_password("admin", "s3cret-pw".into()))
        .await
        .unwrap();
    assert_eq!(registry.state("10.0.0.2"), Some(SessionState::Connected));

    config.save_hosts(&registry.hosts()).unwrap();
    let text = std::fs::read_to_string(config.hosts_path()).unwrap();
    assert!(!text.contains("s3cret-pw"));
    assert!(!text.contains("connected"));
    assert!(!text.contains("kernel"));

    let restored = config.load_hosts().unwrap();
    assert_eq!(restored.len(), 3);
    assert!(restored.iter().all(|h| h.state == SessionState::Discovered));
    assert!(restored.iter().all(|h| h.system_info.is_none()));
    let db = restored.iter().find(|h| h.address == "10.0.0.1").unwrap();
    assert_eq!(db.name, "db");
    // Default names were replaced by the remote hostname
    let scanned = restored.iter().find(|h| h.address == "10.0.0.2").unwrap();
    assert_eq!(scanned.name, "mock-host");
}

#[test]
fn test_settings_and_hosts_live_side_by_side() {
    let dir = TempDir::new().unwrap();
    let config = ConfigManager::with_config_dir(dir.path().join("nested"));

    let mut settings = FleetSettings::default();
    settings.scan.default_ranges = vec!["10.0.0.0/24".into(), "10.0.1.1-20".into()];
    settings.poll.interval_secs = 30;
    config.save_settings(&settings).unwrap();
    config.save_hosts(&mixed_hosts()).unwrap();

    assert_eq!(config.load_settings().unwrap(), settings);
    assert_eq!(config.load_hosts().unwrap().len(), 3);
    assert!(config.settings_path().exists());
    assert!(config.hosts_path().exists());
}
