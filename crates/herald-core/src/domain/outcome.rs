//! Outcome model: what one attempt (and finally one target) ended with.
//!
//! Two enums on purpose:
//! - [`Verdict`] is the verifier's tri-state judgment of the surface.
//! - [`Outcome`] is the terminal result of an attempt as the statistics see it.

use serde::{Deserialize, Serialize};

/// Terminal result of a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Sent,
    Failed,
    TimedOut,
}

impl Outcome {
    pub fn is_sent(self) -> bool {
        matches!(self, Outcome::Sent)
    }
}

/// Verifier judgment.
///
/// - `Sent`: confirmed by structural evidence.
/// - `Failed`: confirmed not sent (the payload is still sitting in the content area).
/// - `Unverified`: plausibly sent, plausibly not. Treated as a failure for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Sent,
    Failed,
    Unverified,
}

impl Verdict {
    pub fn is_sent(self) -> bool {
        matches!(self, Verdict::Sent)
    }
}
