//! Retry policy: bounded attempts with exponential backoff.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounded retry with exponential backoff.
///
/// Used both for whole delivery attempts and for the short polls inside one
/// attempt (context readiness, send control, verification).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of tries, including the first one.
    pub max_attempts: u32,

    /// Delay after the first failed try.
    pub base_delay_ms: u64,

    /// Backoff multiplier. `1.0` gives a constant interval.
    pub multiplier: f64,

    /// Upper bound for a single delay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            base_delay_ms: base_delay.as_millis() as u64,
            multiplier,
            max_delay_ms: None,
        }
    }

    /// Fixed-interval polling.
    pub fn constant(max_attempts: u32, interval: Duration) -> Self {
        Self::new(max_attempts, interval, 1.0)
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay_ms = Some(max_delay.as_millis() as u64);
        self
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Delay before the next try, after `attempts` tries have been made (1-indexed).
    ///
    /// delay = base_delay * multiplier^(attempts - 1), capped by `max_delay_ms`.
    ///
    /// Saturates instead of panicking: an overflowing or non-finite product gives the cap
    /// (or `Duration::MAX`), a negative one gives zero.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let cap = self.max_delay_ms.map_or(Duration::MAX, Duration::from_millis);
        let base_secs = self.base_delay().as_secs_f64();
        let exponent = i32::try_from(attempts.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay_secs = base_secs * self.multiplier.powi(exponent);
        let delay = if delay_secs.is_sign_negative() && !delay_secs.is_nan() {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(delay_secs).unwrap_or(cap)
        };
        delay.min(cap)
    }

    /// `multiplier` is finite and at least `1.0`.
    pub fn has_valid_multiplier(&self) -> bool {
        self.multiplier.is_finite() && self.multiplier >= 1.0
    }

    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

impl Default for RetryPolicy {
    /// 3 attempts, 2s then 4s between them.
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2), 2.0)
    }
}
