//! Job specification, validation and the running statistics tally.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::outcome::Outcome;
use super::payload::Payload;
use super::target::{Target, TargetList};

/// Bounds a job must satisfy before it is accepted.
///
/// Defaults keep a batch small and slow enough that the operator's account
/// does not get throttled by the surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobLimits {
    pub max_targets: usize,
    pub max_payload_chars: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for JobLimits {
    fn default() -> Self {
        Self {
            max_targets: 100,
            max_payload_chars: 4000,
            min_delay_ms: 5_000,
            max_delay_ms: 300_000,
        }
    }
}

/// Why a job was refused before processing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("no valid targets ({rejected} rejected)")]
    NoTargets { rejected: usize },

    #[error("{count} targets exceed the per-job maximum of {max}")]
    TooManyTargets { count: usize, max: usize },

    #[error("payload is empty")]
    EmptyPayload,

    #[error("payload has {len} characters, maximum is {max}")]
    PayloadTooLong { len: usize, max: usize },

    #[error("delay {delay_ms}ms is outside {min_ms}..={max_ms}ms")]
    DelayOutOfRange { delay_ms: u64, min_ms: u64, max_ms: u64 },
}

/// A validated bulk job: ordered unique targets, one payload, one delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    targets: Vec<Target>,
    payload: Payload,
    delay: Duration,
}

impl JobSpec {
    /// Normalize raw addresses and validate everything against `limits`.
    pub fn new<I, S>(
        raw_targets: I,
        payload: impl Into<String>,
        delay_ms: u64,
        limits: &JobLimits,
    ) -> Result<Self, JobError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let list = TargetList::normalize(raw_targets);
        Self::from_targets(list, Payload::new(payload), delay_ms, limits)
    }

    /// Validate an already-normalized target list. The payload is trimmed first.
    pub fn from_targets(
        list: TargetList,
        payload: Payload,
        delay_ms: u64,
        limits: &JobLimits,
    ) -> Result<Self, JobError> {
        if list.targets.is_empty() {
            return Err(JobError::NoTargets {
                rejected: list.rejected.len(),
            });
        }
        if list.targets.len() > limits.max_targets {
            return Err(JobError::TooManyTargets {
                count: list.targets.len(),
                max: limits.max_targets,
            });
        }
        let payload = payload.trimmed();
        if payload.is_blank() {
            return Err(JobError::EmptyPayload);
        }
        let len = payload.char_len();
        if len > limits.max_payload_chars {
            return Err(JobError::PayloadTooLong {
                len,
                max: limits.max_payload_chars,
            });
        }
        if !(limits.min_delay_ms..=limits.max_delay_ms).contains(&delay_ms) {
            return Err(JobError::DelayOutOfRange {
                delay_ms,
                min_ms: limits.min_delay_ms,
                max_ms: limits.max_delay_ms,
            });
        }

        Ok(Self {
            targets: list.targets,
            payload,
            delay: Duration::from_millis(delay_ms),
        })
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Wait between two consecutive targets.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Running tally of a job.
///
/// Counters only grow; `sent + failed <= total` holds after every update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub sent: usize,
    pub failed: usize,
    pub total: usize,
}

impl Statistics {
    pub fn new(total: usize) -> Self {
        Self {
            sent: 0,
            failed: 0,
            total,
        }
    }

    /// Fold one finalized target into the tally.
    pub fn record(&mut self, outcome: Outcome) {
        debug_assert!(self.processed() < self.total, "more results than targets");
        if outcome.is_sent() {
            self.sent += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn processed(&self) -> usize {
        self.sent + self.failed
    }

    pub fn remaining(&self) -> usize {
        self.total - self.processed()
    }

    pub fn is_complete(&self) -> bool {
        self.processed() == self.total
    }
}
