//! Property tests for scan accounting

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

use fleetmon_core::discovery::{AddressRange, Prober, ScanOptions};
use fleetmon_core::testing::MockProbe;
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property: Every address is probed once, exactly the live ones are
    /// reported, and live + failed never exceed attempted
    #[test]
    fn scan_counts_are_consistent(
        size in 1u8..=64,
        live in prop::collection::hash_set(0u8..64, 0..16),
        failing in prop::collection::hash_set(0u8..64, 0..8),
        concurrency in 1usize..16,
    ) {
        let mut probe = MockProbe::new();
        let mut expected_live = HashSet::new();
        for last in &live {
            if *last < size && !failing.contains(last) {
                probe = probe.live(&format!("10.9.0.{last}"));
                expected_live.insert(Ipv4Addr::new(10, 9, 0, *last));
            }
        }
        for last in &failing {
            probe = probe.failing(&format!("10.9.0.{last}"));
        }
        let probe = Arc::new(probe);
        let prober = Prober::new(probe.clone());

        let range = AddressRange::new(
            Ipv4Addr::new(10, 9, 0, 0),
            Ipv4Addr::new(10, 9, 0, size - 1),
        )
        .unwrap();
        let options = ScanOptions {
            max_concurrency: concurrency,
            ..ScanOptions::default()
        };

        let (found, summary) = runtime().block_on(async {
            prober
                .scan(vec![range], options)
                .await
                .unwrap()
                .collect_all()
                .await
        });

        prop_assert_eq!(summary.attempted, u64::from(size));
        prop_assert_eq!(probe.probed(), usize::from(size));
        prop_assert!(summary.live + summary.failed <= summary.attempted);
        let reported: HashSet<Ipv4Addr> = found.iter().map(|h| h.address).collect();
        prop_assert_eq!(reported.len(), found.len());
        prop_assert_eq!(reported, expected_live);
        prop_assert!(!summary.cancelled);
    }
}
