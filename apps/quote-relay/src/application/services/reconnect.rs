//! Reconnection Policy
//!
//! Linear backoff for quote-source reconnection: the wait before attempt
//! *k* is `step * k`, capped at `max_delay`. Once `max_attempts` waits have
//! been handed out the policy reports exhaustion and the caller is expected
//! to sit out the `cooldown` before calling `reset`.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay increment per attempt.
    pub step: Duration,
    /// Maximum delay between reconnection attempts.
    pub max_delay: Duration,
    /// Maximum number of attempts per round (0 = unlimited).
    pub max_attempts: u32,
    /// Pause after a round of attempts is exhausted.
    pub cooldown: Duration,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            step: Duration::from_secs(30),
            max_delay: Duration::from_secs(120),
            max_attempts: 3,
            cooldown: Duration::from_secs(300),
            jitter_factor: 0.0,
        }
    }
}

impl ReconnectConfig {
    /// Undisturbed delay before attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt).min(self.max_delay)
    }
}

/// Reconnection policy implementing capped linear backoff.
///
/// # Example
///
/// ```rust
/// use quote_relay::application::services::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
///
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(30)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(60)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(90)));
/// assert_eq!(policy.next_delay(), None);
///
/// // After the cooldown, start a fresh round
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Get the wait before the next attempt.
    ///
    /// Returns `None` once the round's attempts are used up.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }

        self.attempt_count += 1;
        let base = self.config.delay_for_attempt(self.attempt_count);
        Some(self.apply_jitter(base))
    }

    /// Start a new round of attempts.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Attempts handed out in the current round.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Check if another attempt is allowed in this round.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    /// Pause to take after a round is exhausted.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        self.config.cooldown
    }

    /// Apply jitter to a duration.
    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}
