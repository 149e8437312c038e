//! Events - 制御面へ流すステータスイベント
//!
//! ワイヤ形式は JSON。`{"type": "SEND_PROGRESS", "data": {...}}` のようにタグ付けします。

use serde::{Deserialize, Serialize};

use super::job::Statistics;
use super::target::Target;

/// Progress after one target has been finalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendProgress {
    pub sent: usize,
    pub failed: usize,
    /// 1-indexed position of the target just finished.
    pub current: usize,
    pub total: usize,
    pub current_target: Target,
}

/// Final tally. Emitted exactly once per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendComplete {
    pub sent: usize,
    pub failed: usize,
    pub total: usize,
}

impl From<Statistics> for SendComplete {
    fn from(stats: Statistics) -> Self {
        Self {
            sent: stats.sent,
            failed: stats.failed,
            total: stats.total,
        }
    }
}

/// Outbound event on the status channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusEvent {
    SendProgress(SendProgress),
    SendComplete(SendComplete),
}

impl StatusEvent {
    pub fn progress(stats: Statistics, current: usize, target: Target) -> Self {
        StatusEvent::SendProgress(SendProgress {
            sent: stats.sent,
            failed: stats.failed,
            current,
            total: stats.total,
            current_target: target,
        })
    }

    pub fn complete(stats: Statistics) -> Self {
        StatusEvent::SendComplete(stats.into())
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, StatusEvent::SendComplete(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_wire_shape() {
        let stats = Statistics { sent: 1, failed: 0, total: 3 };
        let event = StatusEvent::progress(stats, 1, Target::parse("+15551234567").unwrap());
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "type": "SEND_PROGRESS",
                "data": {
                    "sent": 1,
                    "failed": 0,
                    "current": 1,
                    "total": 3,
                    "currentTarget": "+15551234567"
                }
            })
        );
    }

    #[test]
    fn complete_wire_shape() {
        let event = StatusEvent::complete(Statistics { sent: 0, failed: 1, total: 1 });
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "SEND_COMPLETE");
        assert_eq!(v["data"]["failed"], 1);
        assert!(event.is_complete());
    }
}
