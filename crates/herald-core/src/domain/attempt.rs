//! Attempt state machine and execution history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::AttemptId;
use super::outcome::Outcome;
use super::target::Target;

/// Per-attempt state.
///
/// State transitions:
/// - Start -> ContextAcquired -> ContentInjected -> Submitted -> Verifying -> Succeeded
/// - any non-terminal state -> Failed
///
/// There is no partial-success state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Start,
    ContextAcquired,
    ContentInjected,
    Submitted,
    Verifying,
    Succeeded,
    Failed,
}

impl AttemptState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptState::Succeeded | AttemptState::Failed)
    }

    /// Is `next` a legal successor of `self`?
    pub fn can_transition_to(self, next: AttemptState) -> bool {
        use AttemptState::*;
        match (self, next) {
            (s, Failed) => !s.is_terminal(),
            (Start, ContextAcquired)
            | (ContextAcquired, ContentInjected)
            | (ContentInjected, Submitted)
            | (Submitted, Verifying)
            | (Verifying, Succeeded) => true,
            _ => false,
        }
    }
}

/// One finished delivery attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt_id: AttemptId,
    pub target: Target,

    /// 1-indexed attempt number for this target.
    pub number: u32,

    /// Furthest state reached. `Succeeded` for a sent attempt.
    pub reached: AttemptState,

    pub outcome: Outcome,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// Everything the worker did for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub target: Target,
    pub outcome: Outcome,
    pub attempts: Vec<AttemptRecord>,
}

impl DeliveryReport {
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.attempts.last().and_then(|a| a.error.as_deref())
    }
}
