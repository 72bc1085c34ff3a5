//! IPv4 address range parsing and lazy expansion
//!
//! Accepted forms:
//! - CIDR: `192.168.1.0/24` (every address in the block)
//! - dash range: `10.0.0.5-10.0.0.9` or `10.0.0.5-9`
//! - single address: `10.0.0.7`

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::{ScanError, ScanResult};

/// An inclusive IPv4 range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressRange {
    start: u32,
    end: u32,
}

impl AddressRange {
    /// Range covering `start..=end`
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidRange`] if `end` precedes `start`.
    pub fn new(start: Ipv4Addr, end: Ipv4Addr) -> ScanResult<Self> {
        let (start, end) = (u32::from(start), u32::from(end));
        if end < start {
            return Err(invalid(
                &format!("{}-{}", Ipv4Addr::from(start), Ipv4Addr::from(end)),
                "end address precedes start address",
            ));
        }
        Ok(Self { start, end })
    }

    /// Range containing a single address
    #[must_use]
    pub fn single(addr: Ipv4Addr) -> Self {
        let value = u32::from(addr);
        Self {
            start: value,
            end: value,
        }
    }

    /// Parses any accepted form.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidRange`] describing what is wrong.
    pub fn parse(input: &str) -> ScanResult<Self> {
        let text = input.trim();
        if text.is_empty() {
            return Err(invalid(input, "empty range"));
        }

        if let Some((addr, prefix)) = text.split_once('/') {
            return Self::parse_cidr(text, addr, prefix);
        }

        if let Some((start, end)) = text.split_once('-') {
            let start = parse_addr(text, start)?;
            let end = end.trim();
            let end = if end.contains('.') {
                parse_addr(text, end)?
            } else {
                // Short form: only the last octet
                let last: u8 = end
                    .parse()
                    .map_err(|_| invalid(text, "end must be an address or a last octet"))?;
                let [a, b, c, _] = start.octets();
                Ipv4Addr::new(a, b, c, last)
            };
            return Self::new(start, end).map_err(|_| invalid(text, "end precedes start"));
        }

        parse_addr(text, text).map(Self::single)
    }

    fn parse_cidr(text: &str, addr: &str, prefix: &str) -> ScanResult<Self> {
        let addr = parse_addr(text, addr)?;
        let prefix: u32 = prefix
            .trim()
            .parse()
            .map_err(|_| invalid(text, "prefix length is not a number"))?;
        if prefix > 32 {
            return Err(invalid(text, "prefix length exceeds 32"));
        }
        let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
        let start = u32::from(addr) & mask;
        Ok(Self {
            start,
            end: start | !mask,
        })
    }

    /// Number of addresses in the range
    #[must_use]
    pub const fn len(&self) -> u64 {
        (self.end - self.start) as u64 + 1
    }

    /// Always false; a range holds at least one address
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// First address
    #[must_use]
    pub fn first(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.start)
    }

    /// Last address
    #[must_use]
    pub fn last(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.end)
    }

    /// Lazily yields every address in order
    pub fn iter(&self) -> impl Iterator<Item = Ipv4Addr> + Send + use<> {
        (self.start..=self.end).map(Ipv4Addr::from)
    }
}

impl FromStr for AddressRange {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.first())
        } else {
            write!(f, "{}-{}", self.first(), self.last())
        }
    }
}

/// Parses every range, failing on the first invalid one.
///
/// # Errors
///
/// Returns [`ScanError::EmptyRanges`] for an empty list or the first
/// [`ScanError::InvalidRange`].
pub fn parse_ranges<S: AsRef<str>>(inputs: &[S]) -> ScanResult<Vec<AddressRange>> {
    if inputs.is_empty() {
        return Err(ScanError::EmptyRanges);
    }
    inputs.iter().map(|s| AddressRange::parse(s.as_ref())).collect()
}

/// Lazily chains the addresses of several ranges
pub fn expand(ranges: &[AddressRange]) -> impl Iterator<Item = Ipv4Addr> + Send + use<> {
    ranges
        .to_vec()
        .into_iter()
        .flat_map(|r| (r.start..=r.end).map(Ipv4Addr::from))
}

/// Total number of addresses across ranges
#[must_use]
pub fn total_addresses(ranges: &[AddressRange]) -> u64 {
    ranges.iter().map(AddressRange::len).sum()
}

fn parse_addr(range: &str, text: &str) -> ScanResult<Ipv4Addr> {
    text.trim()
        .parse()
        .map_err(|_| invalid(range, &format!("'{}' is not an IPv4 address", text.trim())))
}

fn invalid(range: &str, reason: &str) -> ScanError {
    ScanError::InvalidRange {
        range: range.to_string(),
        reason: reason.to_string(),
    }
}
