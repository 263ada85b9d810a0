//! Reconnection backoff.
//!
//! The delay doubles on every failure that schedules a reconnect and drops
//! back to the base delay only once a connection actually opens.

use std::time::Duration;

use tracing::debug;

use crate::{DEFAULT_MAX_RETRY_DELAY, DEFAULT_RETRY_DELAY};

/// Backoff state for the reconnect timer.
#[derive(Debug, Clone)]
pub struct RetryState {
    base_delay: Duration,
    max_delay: Duration,
    current_delay: Duration,
    jitter: bool,
    attempts: u32,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_DELAY, DEFAULT_MAX_RETRY_DELAY)
    }
}

impl RetryState {
    /// Create a new retry state starting at `base_delay`.
    ///
    /// A `max_delay` below `base_delay` is raised to `base_delay`.
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
            current_delay: base_delay,
            jitter: false,
            attempts: 0,
        }
    }

    /// Enable or disable jitter on the waited delay.
    #[must_use]
    pub const fn with_jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Delay the next scheduled reconnect will wait (before jitter).
    #[must_use]
    pub const fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// Base delay restored on success.
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Cap on the delay.
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Reconnects scheduled since the last success.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// A connection opened: restart from the base delay.
    pub const fn on_success(&mut self) {
        self.current_delay = self.base_delay;
        self.attempts = 0;
    }

    /// A reconnect is being scheduled: return the delay to wait and grow the
    /// next one.
    pub fn on_failure_scheduled(&mut self) -> Duration {
        let delay = self.current_delay;
        self.current_delay = delay.saturating_mul(2).min(self.max_delay);
        self.attempts = self.attempts.saturating_add(1);

        let waited = if self.jitter { apply_jitter(delay) } else { delay };
        debug!(
            attempt = self.attempts,
            delay_ms = waited.as_millis(),
            next_delay_ms = self.current_delay.as_millis(),
            "Scheduling reconnect"
        );
        waited
    }

    /// Replace the base delay with a server-provided hint, clamped to the cap.
    ///
    /// Takes effect at the next success; the in-flight sequence is untouched.
    /// A zero hint is ignored, the delay must stay positive to keep growing.
    /// Returns whether the hint was applied.
    pub fn set_base_delay(&mut self, delay: Duration) -> bool {
        if delay.is_zero() {
            debug!("Ignoring zero retry hint");
            return false;
        }
        self.base_delay = delay.min(self.max_delay);
        true
    }
}

/// Scale a delay by a random factor in `[0.5, 1.5)`.
fn apply_jitter(delay: Duration) -> Duration {
    let factor = 0.5 + rand::random::<f64>();
    delay.mul_f64(factor)
}
