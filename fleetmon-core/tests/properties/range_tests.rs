//! Property tests for address range parsing

use std::net::Ipv4Addr;

use fleetmon_core::discovery::{AddressRange, expand, parse_ranges, total_addresses};
use proptest::prelude::*;

proptest! {
    /// Property: A CIDR block of prefix p holds 2^(32-p) addresses and every
    /// one of them shares the network bits
    #[test]
    fn cidr_size_and_membership(addr in any::<u32>(), prefix in 16u32..=32) {
        let input = format!("{}/{prefix}", Ipv4Addr::from(addr));
        let range = AddressRange::parse(&input).unwrap();

        prop_assert_eq!(range.len(), 1u64 << (32 - prefix));
        let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
        prop_assert_eq!(u32::from(range.first()), addr & mask);
        prop_assert_eq!(u32::from(range.last()), (addr & mask) | !mask);
    }

    /// Property: Lazy expansion yields exactly `len` ascending addresses
    #[test]
    fn expansion_matches_len(start in any::<u32>(), span in 0u32..2048) {
        let end = start.saturating_add(span);
        let range = AddressRange::new(Ipv4Addr::from(start), Ipv4Addr::from(end)).unwrap();

        let addresses: Vec<u32> = range.iter().map(u32::from).collect();
        prop_assert_eq!(addresses.len() as u64, range.len());
        prop_assert!(addresses.windows(2).all(|w| w[0] + 1 == w[1]));
        prop_assert_eq!(addresses.first().copied(), Some(start));
        prop_assert_eq!(addresses.last().copied(), Some(end));
    }

    /// Property: Short dash form covers start..=last octet
    #[test]
    fn dash_short_form(a in any::<u8>(), b in any::<u8>(), c in any::<u8>(), lo in any::<u8>(), hi in any::<u8>()) {
        let input = format!("{a}.{b}.{c}.{lo}-{hi}");
        let parsed = AddressRange::parse(&input);
        if lo <= hi {
            let range = parsed.unwrap();
            prop_assert_eq!(range.first(), Ipv4Addr::new(a, b, c, lo));
            prop_assert_eq!(range.last(), Ipv4Addr::new(a, b, c, hi));
        } else {
            prop_assert!(parsed.is_err());
        }
    }

    /// Property: Several ranges expand to the sum of their sizes
    #[test]
    fn total_is_sum_of_parts(prefixes in prop::collection::vec(24u32..=32, 1..5)) {
        let inputs: Vec<String> = prefixes
            .iter()
            .enumerate()
            .map(|(i, p)| format!("10.{i}.0.0/{p}"))
            .collect();
        let ranges = parse_ranges(&inputs).unwrap();

        let expected: u64 = prefixes.iter().map(|p| 1u64 << (32 - p)).sum();
        prop_assert_eq!(total_addresses(&ranges), expected);
        prop_assert_eq!(expand(&ranges).count() as u64, expected);
    }

    /// Property: Garbage never parses
    #[test]
    fn rejects_non_addresses(input in "[a-z]{1,12}") {
        prop_assert!(AddressRange::parse(&input).is_err());
    }
}
