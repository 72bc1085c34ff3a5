//! Reconnect retry logic with exponential backoff
//!
//! This module provides retry configuration and state for re-establishing
//! sessions after a transient failure.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default maximum number of retry attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default initial delay between retries in milliseconds
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;

/// Default maximum delay between retries in milliseconds
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Default backoff multiplier (delay doubles each retry)
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Configuration for reconnect behavior
///
/// Implements exponential backoff with configurable parameters.
/// The delay between retries is calculated as:
/// `min(initial_delay * multiplier^attempt, max_delay)`
///
/// `max_attempts = None` retries forever; the delay stays capped at
/// `max_delay_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (`None` = unlimited, written as
    /// `"unlimited"` in config files)
    #[serde(with = "attempts")]
    pub max_attempts: Option<u32>,
    /// Initial delay between retries in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Whether automatic reconnect is enabled
    pub enabled: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            enabled: true,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a retry configuration with no automatic reconnect
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: Some(0),
            enabled: false,
            ..Self::default()
        }
    }

    /// Creates a retry configuration that never gives up
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_attempts: None,
            ..Self::default()
        }
    }

    /// Sets the maximum number of retry attempts
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the initial delay between retries
    #[must_use]
    pub const fn with_initial_delay_ms(mut self, delay_ms: u64) -> Self {
        self.initial_delay_ms = delay_ms;
        self
    }

    /// Sets the maximum delay between retries
    #[must_use]
    pub const fn with_max_delay_ms(mut self, delay_ms: u64) -> Self {
        self.max_delay_ms = delay_ms;
        self
    }

    /// Sets the backoff multiplier
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables retry
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Calculates the delay for a given attempt number (0-indexed)
    ///
    /// Returns `None` if retry is disabled or attempt exceeds max_attempts.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if !self.should_retry(attempt) {
            return None;
        }

        // Clamp the exponent so unlimited retries cannot overflow to inf
        let exponent = attempt.min(64) as i32;
        let delay_ms = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped_delay_ms = if delay_ms.is_finite() {
            (delay_ms as u64).min(self.max_delay_ms)
        } else {
            self.max_delay_ms
        };

        Some(Duration::from_millis(capped_delay_ms))
    }

    /// Returns whether another retry should be attempted
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        if !self.enabled {
            return false;
        }
        match self.max_attempts {
            Some(max) => attempt < max,
            None => true,
        }
    }
}

/// State tracker for retry operations
///
/// Tracks the current attempt number and the most recent failure for one
/// host's reconnect loop.
#[derive(Debug, Clone)]
pub struct RetryState {
    /// Current attempt number (0-indexed)
    current_attempt: u32,
    /// Configuration for retry behavior
    config: RetryConfig,
    /// Last error message (if any)
    last_error: Option<String>,
}

impl RetryState {
    /// Creates a new retry state with the given configuration
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self {
            current_attempt: 0,
            config,
            last_error: None,
        }
    }

    /// Returns the current attempt number (0-indexed)
    #[must_use]
    pub const fn current_attempt(&self) -> u32 {
        self.current_attempt
    }

    /// Returns the current attempt number (1-indexed, for display)
    #[must_use]
    pub const fn attempt_number(&self) -> u32 {
        self.current_attempt + 1
    }

    /// Returns whether another retry should be attempted
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.should_retry(self.current_attempt)
    }

    /// Returns the delay before the next retry attempt
    #[must_use]
    pub fn next_delay(&self) -> Option<Duration> {
        self.config.delay_for_attempt(self.current_attempt)
    }

    /// Records a failed attempt and advances to the next retry
    ///
    /// Returns `true` if another retry will be attempted, `false` if exhausted.
    pub fn record_failure(&mut self, error: impl Into<String>) -> bool {
        self.last_error = Some(error.into());
        self.current_attempt = self.current_attempt.saturating_add(1);
        self.should_retry()
    }

    /// Resets the retry state for a new reconnect cycle
    pub fn reset(&mut self) {
        self.current_attempt = 0;
        self.last_error = None;
    }

    /// Returns the last error message
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns the retry configuration
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }
}

mod attempts {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    const UNLIMITED: &str = "unlimited";

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Count(u32),
        Word(String),
    }

    #[allow(clippy::ref_option, clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &Option<u32>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(count) => serializer.serialize_u32(*count),
            None => serializer.serialize_str(UNLIMITED),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Count(count) => Ok(Some(count)),
            Repr::Word(word) if word == UNLIMITED => Ok(None),
            Repr::Word(word) => Err(D::Error::custom(format!(
                "expected a number or \"{UNLIMITED}\", got \"{word}\""
            ))),
        }
    }
}
