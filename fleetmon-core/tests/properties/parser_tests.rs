//! Property tests for remote output parsers

use fleetmon_core::monitoring::{CommandKind, CommandOutput, MetricsParser};
use proptest::prelude::*;

proptest! {
    /// Property: CPU usage from two /proc/stat readings stays within 0..=100
    /// and matches the busy share of the delta
    #[test]
    fn cpu_percent_in_bounds(
        base in prop::collection::vec(0u64..1_000_000_000, 8),
        delta in prop::collection::vec(0u64..100_000, 8),
    ) {
        let line = |v: &[u64]| {
            format!(
                "cpu  {}",
                v.iter().map(u64::to_string).collect::<Vec<_>>().join(" ")
            )
        };
        let next: Vec<u64> = base.iter().zip(&delta).map(|(b, d)| b + d).collect();
        let output = format!("{}\n{}\n", line(&base), line(&next));

        let pct = MetricsParser::parse_cpu(&output).unwrap();
        prop_assert!((0.0..=100.0).contains(&pct));

        let total: u64 = delta.iter().sum();
        if total > 0 {
            let idle = delta[3] + delta[4];
            let expected = (total - idle) as f32 / total as f32 * 100.0;
            prop_assert!((pct - expected).abs() < 0.01);
        }
    }

    /// Property: Used memory never exceeds total
    #[test]
    fn meminfo_used_bounded(total in 1u64..1_000_000_000, available in 0u64..2_000_000_000) {
        let output = format!("MemTotal: {total} kB\nMemAvailable: {available} kB\n");
        let mem = MetricsParser::parse_meminfo(&output).unwrap();

        prop_assert_eq!(mem.total_kib, total);
        prop_assert!(mem.used_kib <= mem.total_kib);
        prop_assert_eq!(mem.used_kib + mem.available_kib, mem.total_kib);
        prop_assert!((0.0..=100.0).contains(&mem.percent()));
    }

    /// Property: The process table is truncated to the configured size and
    /// ordered by CPU, while the count covers every row
    #[test]
    fn processes_truncated_and_sorted(
        rows in prop::collection::vec((0u16..1000, 0u16..1000, "[a-z]{1,10}"), 1..40),
        top in 1usize..10,
    ) {
        let output: String = rows
            .iter()
            .map(|(cpu, mem, name)| format!("{}.{} {}.0 {name}\n", cpu / 10, cpu % 10, mem / 10))
            .collect();

        let parser = MetricsParser::new(top);
        let Ok(CommandOutput::Processes(list)) = parser.parse(CommandKind::Processes, &output) else {
            return Err(TestCaseError::fail("process table rejected"));
        };

        prop_assert_eq!(list.count as usize, rows.len());
        prop_assert_eq!(list.top.len(), rows.len().min(top));
        prop_assert!(list.top.windows(2).all(|w| w[0].cpu_percent >= w[1].cpu_percent));
    }

    /// Property: Output without the liveness marker never counts as alive
    #[test]
    fn echo_requires_marker(noise in "[ -~]{0,64}") {
        let parser = MetricsParser::default();
        let result = parser.parse(CommandKind::Echo, &noise);
        prop_assert_eq!(result.is_ok(), noise.trim() == "fleetmon-alive");
    }

    /// Property: Parsers never panic on arbitrary input
    #[test]
    fn parsers_total_on_garbage(input in "\\PC{0,200}") {
        let parser = MetricsParser::default();
        for kind in CommandKind::METRICS_BATCH {
            let _ = parser.parse(kind, &input);
        }
        let _ = parser.parse(CommandKind::SystemInfo, &input);
    }
}
