//! Bounded per-host sample history

use std::collections::VecDeque;

use crate::monitoring::Sample;

/// Default number of samples kept per host
pub const DEFAULT_HISTORY_CAPACITY: usize = 120;

/// Fixed-capacity ring buffer of samples, oldest first
///
/// Timestamps are strictly increasing; [`push`](Self::push) refuses a sample
/// that is not newer than the latest one.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl HistoryBuffer {
    /// Creates an empty buffer. A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a sample, evicting the oldest when full.
    ///
    /// Returns `false` (and stores nothing) if the sample is not newer than
    /// the latest stored sample.
    pub fn push(&mut self, sample: Sample) -> bool {
        if self
            .samples
            .back()
            .is_some_and(|last| sample.timestamp <= last.timestamp)
        {
            return false;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        true
    }

    /// Most recent sample
    #[must_use]
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Iterates oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Copies the samples, oldest first
    #[must_use]
    pub fn to_vec(&self) -> Vec<Sample> {
        self.samples.iter().cloned().collect()
    }

    /// Number of stored samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if no samples are stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of samples
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every sample
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    fn at(offset_secs: i64) -> Sample {
        Sample::empty_at(Utc::now() + Duration::seconds(offset_secs))
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let mut buf = HistoryBuffer::new(3);
        let base = Utc::now();
        for i in 0..5 {
            assert!(buf.push(Sample::empty_at(base + Duration::seconds(i))));
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(
            buf.iter().next().map(|s| s.timestamp),
            Some(base + Duration::seconds(2))
        );
        assert_eq!(
            buf.latest().map(|s| s.timestamp),
            Some(base + Duration::seconds(4))
        );
    }

    #[test]
    fn test_rejects_non_newer_sample() {
        let mut buf = HistoryBuffer::new(4);
        let sample = at(10);
        assert!(buf.push(sample.clone()));
        assert!(!buf.push(sample));
        assert!(!buf.push(at(-10)));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let mut buf = HistoryBuffer::new(0);
        assert_eq!(buf.capacity(), 1);
        buf.push(at(0));
        buf.push(at(1));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut buf = HistoryBuffer::default();
        buf.push(at(0));
        buf.clear();
        assert!(buf.is_empty());
        assert!(buf.latest().is_none());
    }
}
