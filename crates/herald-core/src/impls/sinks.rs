//! StatusSink implementations.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::info;

use crate::domain::StatusEvent;
use crate::ports::StatusSink;

/// Forwards events into an unbounded channel (the status channel's outbound half).
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusSink for ChannelSink {
    fn emit(&self, event: StatusEvent) {
        // ignore send error: nobody is listening any more
        let _ = self.tx.send(event);
    }
}

/// Logs events and drops them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn emit(&self, event: StatusEvent) {
        match event {
            StatusEvent::SendProgress(p) => info!(
                sent = p.sent,
                failed = p.failed,
                current = p.current,
                total = p.total,
                target = %p.current_target,
                "progress"
            ),
            StatusEvent::SendComplete(c) => {
                info!(sent = c.sent, failed = c.failed, total = c.total, "complete")
            }
        }
    }
}

/// Keeps every event, for assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<StatusEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StatusSink for RecordingSink {
    fn emit(&self, event: StatusEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
