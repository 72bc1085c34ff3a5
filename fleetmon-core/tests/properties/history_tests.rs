//! Property tests for the bounded sample history

use chrono::{Duration, TimeZone, Utc};
use fleetmon_core::monitoring::Sample;
use fleetmon_core::registry::HistoryBuffer;
use proptest::prelude::*;

fn sample_at(offset_secs: i64) -> Sample {
    let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    Sample::empty_at(base + Duration::seconds(offset_secs))
}

proptest! {
    /// Property: The buffer never holds more than its capacity
    #[test]
    fn never_exceeds_capacity(capacity in 1usize..64, pushes in 0usize..256) {
        let mut buffer = HistoryBuffer::new(capacity);
        for i in 0..pushes {
            prop_assert!(buffer.push(sample_at(i as i64)));
            prop_assert!(buffer.len() <= capacity);
        }
        prop_assert_eq!(buffer.len(), pushes.min(capacity));
    }

    /// Property: After overflow the buffer holds exactly the newest samples,
    /// oldest first
    #[test]
    fn keeps_newest_in_order(capacity in 1usize..32, pushes in 1usize..128) {
        let mut buffer = HistoryBuffer::new(capacity);
        for i in 0..pushes {
            buffer.push(sample_at(i as i64));
        }

        let kept: Vec<i64> = buffer
            .iter()
            .map(|s| (s.timestamp - sample_at(0).timestamp).num_seconds())
            .collect();
        let first = pushes.saturating_sub(capacity) as i64;
        let expected: Vec<i64> = (first..pushes as i64).collect();
        prop_assert_eq!(kept, expected);
        prop_assert_eq!(
            buffer.latest().map(|s| s.timestamp),
            Some(sample_at(pushes as i64 - 1).timestamp)
        );
    }

    /// Property: A sample not newer than the latest is refused and changes
    /// nothing
    #[test]
    fn stale_samples_rejected(latest in 0i64..1000, back in 0i64..1000) {
        let mut buffer = HistoryBuffer::new(8);
        buffer.push(sample_at(latest));
        let before = buffer.to_vec();

        prop_assert!(!buffer.push(sample_at(latest - back)));
        prop_assert_eq!(buffer.to_vec(), before);
    }
}
