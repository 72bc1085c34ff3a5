//! Scanning into the registry

use std::sync::Arc;
use std::time::Duration;

use fleetmon_core::discovery::{Probe, Prober, ScanOptions, parse_ranges};
use fleetmon_core::models::{DiscoveryOrigin, SessionState};
use fleetmon_core::registry::FleetRegistry;
use fleetmon_core::testing::MockProbe;
use fleetmon_core::{Host, ScanError};
use futures::StreamExt;

#[tokio::test]
async fn test_scan_slash_30_registers_the_live_host() {
    let registry = FleetRegistry::new(10);
    let prober = Prober::new(Arc::new(MockProbe::new().live("192.168.1.1")));

    let stream = prober
        .scan(parse_ranges(&["192.168.1.0/30"]).unwrap(), ScanOptions::default())
        .await
        .unwrap();
    let (added, summary) = stream.ingest(&registry).await;

    assert_eq!(summary.attempted, 4);
    assert_eq!(summary.live, 1);
    assert_eq!(added.len(), 1);

    let hosts = registry.hosts();
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].address, "192.168.1.1");
    assert_eq!(hosts[0].state, SessionState::Discovered);
    assert_eq!(hosts[0].origin, DiscoveryOrigin::Scanned);
}

#[tokio::test]
async fn test_rescan_keeps_manual_entries() {
    let registry = FleetRegistry::new(10);
    registry
        .add(Host::new("10.0.0.2", DiscoveryOrigin::Manual).with_name("db"))
        .unwrap();
    let prober = Prober::new(Arc::new(MockProbe::new().live("10.0.0.2").live("10.0.0.3")));

    let (added, _) = prober
        .scan(parse_ranges(&["10.0.0.1-4"]).unwrap(), ScanOptions::default())
        .await
        .unwrap()
        .ingest(&registry)
        .await;

    assert_eq!(added.len(), 1);
    assert_eq!(registry.len(), 2);
    let db = registry.get("10.0.0.2").unwrap();
    assert_eq!(db.name, "db");
    assert_eq!(db.origin, DiscoveryOrigin::Manual);
}

#[tokio::test]
async fn test_cancel_stops_new_probes() {
    let probe = Arc::new(
        MockProbe::new()
            .all_live()
            .with_delay(Duration::from_millis(20)),
    );
    let shared: Arc<dyn Probe> = probe.clone();
    let prober = Prober::new(shared);
    let options = ScanOptions {
        probe_timeout: Duration::from_secs(1),
        max_concurrency: 4,
    };

    let mut stream = prober
        .scan(parse_ranges(&["10.1.0.0/24"]).unwrap(), options)
        .await
        .unwrap();
    assert!(stream.next().await.is_some());
    stream.cancel();
    let summary = stream.finish().await;

    assert!(summary.cancelled);
    assert!(summary.attempted < 256);
    assert!(summary.live <= summary.attempted);
    assert!(!prober.is_scanning());
}

#[tokio::test]
async fn test_second_scan_rejected_while_running() {
    let prober = Prober::new(Arc::new(
        MockProbe::new().with_delay(Duration::from_millis(50)),
    ));
    let ranges = parse_ranges(&["10.2.0.0/29"]).unwrap();

    let first = prober.scan(ranges.clone(), ScanOptions::default()).await.unwrap();
    let second = prober.scan(ranges.clone(), ScanOptions::default()).await;
    assert!(matches!(second, Err(ScanError::AlreadyRunning(id)) if id == first.job().id()));

    first.finish().await;
    let third = prober.scan(ranges, ScanOptions::default()).await;
    assert!(third.is_ok());
}

#[tokio::test]
async fn test_unavailable_mechanism_fails_before_scanning() {
    let probe = Arc::new(MockProbe::new().unavailable());
    let shared: Arc<dyn Probe> = probe.clone();
    let prober = Prober::new(shared);

    let result = prober
        .scan(parse_ranges(&["10.3.0.1"]).unwrap(), ScanOptions::default())
        .await;

    assert!(matches!(result, Err(ScanError::ProbeUnavailable(_))));
    assert_eq!(probe.probed(), 0);
}
