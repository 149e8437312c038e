//! Decision model: what the Delivery Worker does after a failed attempt.
//!
//! The decider is a pure function of (attempts made, last error). Executing the
//! decision (sleeping, opening a fresh context) is the worker's job.

use std::time::Duration;

use super::errors::DeliveryError;
use super::retry::RetryPolicy;

/// Next action for a target whose latest attempt did not end in `Sent`.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Start a fresh attempt against a fresh context after `delay`.
    Retry { delay: Duration, reason: String },

    /// Give up on this target; it counts as failed.
    Finalize { reason: String },
}

/// Decides retry vs. finalize.
pub trait Decider: Send + Sync {
    /// `attempts` is the number of attempts already made for this target (1-indexed).
    fn decide(&self, attempts: u32, error: &DeliveryError) -> Decision;
}

/// Attempt-budget decider:
/// - non-retryable errors finalize immediately
/// - retry while attempts < max_attempts
/// - finalize once the budget is spent
#[derive(Debug, Clone)]
pub struct RetryDecider {
    policy: RetryPolicy,
}

impl RetryDecider {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl Decider for RetryDecider {
    fn decide(&self, attempts: u32, error: &DeliveryError) -> Decision {
        if !error.is_retryable() {
            return Decision::Finalize {
                reason: format!("not retryable: {error}"),
            };
        }
        if self.policy.is_exhausted(attempts) {
            return Decision::Finalize {
                reason: format!(
                    "max attempts reached: {}/{}",
                    attempts, self.policy.max_attempts
                ),
            };
        }
        let delay = self.policy.next_delay(attempts);
        Decision::Retry {
            delay,
            reason: format!(
                "retry attempt {}/{} after {:?}: {error}",
                attempts + 1,
                self.policy.max_attempts,
                delay
            ),
        }
    }
}
