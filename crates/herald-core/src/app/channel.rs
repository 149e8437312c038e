//! Status Channel - 制御面とのメッセージ境界
//!
//! 受信: `START_BULK_SEND` / `STOP_BULK_SEND`（JSON, `{"type": ..., "data": ...}`）
//! 送信: `SEND_PROGRESS` / `SEND_COMPLETE`（[`StatusSink`](crate::ports::StatusSink) 経由）
//!
//! 各リクエストには必ず `{success, error?}` を返します。

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::orchestrator::Orchestrator;

pub const UNKNOWN_MESSAGE_TYPE: &str = "Unknown message type";

/// Recipients as sent by the control surface: a list, or one pasted text blob.
///
/// Every entry is further split on newlines and commas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTargets {
    List(Vec<String>),
    Text(String),
}

impl RawTargets {
    pub fn entries(&self) -> Vec<&str> {
        match self {
            RawTargets::List(items) => items.iter().flat_map(|s| split_entries(s)).collect(),
            RawTargets::Text(text) => split_entries(text).collect(),
        }
    }
}

fn split_entries(s: &str) -> std::str::Split<'_, [char; 2]> {
    s.split(['\n', ','])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBulkSend {
    pub targets: RawTargets,
    pub payload: String,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlRequest {
    StartBulkSend(StartBulkSend),
    StopBulkSend,
}

impl ControlRequest {
    const KNOWN_TYPES: [&'static str; 2] = ["START_BULK_SEND", "STOP_BULK_SEND"];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Request handler in front of an [`Orchestrator`].
#[derive(Clone)]
pub struct StatusChannel {
    orchestrator: Orchestrator,
}

impl StatusChannel {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    pub fn handle(&self, request: ControlRequest) -> ControlResponse {
        match request {
            ControlRequest::StartBulkSend(start) => {
                match self.orchestrator.submit_raw(
                    start.targets.entries(),
                    start.payload,
                    start.delay_ms,
                ) {
                    Ok(_) => ControlResponse::ok(),
                    Err(e) => ControlResponse::rejected(e.to_string()),
                }
            }
            ControlRequest::StopBulkSend => {
                self.orchestrator.stop();
                ControlResponse::ok()
            }
        }
    }

    /// Decode and handle one JSON request.
    ///
    /// An unrecognized `type` answers [`UNKNOWN_MESSAGE_TYPE`]; a known type with a
    /// malformed body answers the decode error.
    pub fn handle_json(&self, raw: &str) -> ControlResponse {
        let value: serde_json::Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "undecodable control message");
                return ControlResponse::rejected(UNKNOWN_MESSAGE_TYPE);
            }
        };
        let known = value
            .get("type")
            .and_then(|t| t.as_str())
            .is_some_and(|t| ControlRequest::KNOWN_TYPES.contains(&t));
        if !known {
            return ControlResponse::rejected(UNKNOWN_MESSAGE_TYPE);
        }
        match serde_json::from_value::<ControlRequest>(value) {
            Ok(request) => self.handle(request),
            Err(e) => ControlResponse::rejected(e.to_string()),
        }
    }

    /// Serve requests on a background task until every client is dropped.
    pub fn spawn(self) -> ControlClient {
        let (tx, mut rx) = mpsc::channel::<(ControlRequest, oneshot::Sender<ControlResponse>)>(16);
        tokio::spawn(async move {
            while let Some((request, reply)) = rx.recv().await {
                // ignore send error: the caller stopped waiting
                let _ = reply.send(self.handle(request));
            }
        });
        ControlClient { tx }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("status channel closed")]
pub struct ChannelClosed;

/// Sending half of a spawned [`StatusChannel`].
#[derive(Debug, Clone)]
pub struct ControlClient {
    tx: mpsc::Sender<(ControlRequest, oneshot::Sender<ControlResponse>)>,
}

impl ControlClient {
    pub async fn request(&self, request: ControlRequest) -> Result<ControlResponse, ChannelClosed> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((request, reply_tx))
            .await
            .map_err(|_| ChannelClosed)?;
        reply_rx.await.map_err(|_| ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::EngineConfig;
    use crate::app::worker::DeliveryWorker;
    use crate::impls::scripted::ScriptedProvider;
    use crate::impls::sinks::RecordingSink;
    use crate::ports::{SystemClock, UlidGenerator};
    use rstest::rstest;
    use std::sync::Arc;

    fn channel() -> StatusChannel {
        let config = EngineConfig::default();
        let worker = DeliveryWorker::new(&config, Arc::new(ScriptedProvider::default()));
        StatusChannel::new(Orchestrator::new(
            worker,
            Arc::new(RecordingSink::new()),
            Arc::new(UlidGenerator::new(SystemClock)),
            config.limits,
        ))
    }

    #[test]
    fn start_request_wire_shape() {
        let request: ControlRequest = serde_json::from_str(
            r#"{"type":"START_BULK_SEND","data":{"targets":["+15551234567"],"payload":"hi","delayMs":5000}}"#,
        )
        .unwrap();
        assert_eq!(
            request,
            ControlRequest::StartBulkSend(StartBulkSend {
                targets: RawTargets::List(vec!["+15551234567".into()]),
                payload: "hi".into(),
                delay_ms: 5000,
            })
        );
        let stop: ControlRequest = serde_json::from_str(r#"{"type":"STOP_BULK_SEND"}"#).unwrap();
        assert_eq!(stop, ControlRequest::StopBulkSend);
    }

    #[test]
    fn response_omits_absent_error() {
        assert_eq!(
            serde_json::to_string(&ControlResponse::ok()).unwrap(),
            r#"{"success":true}"#
        );
    }

    #[test]
    fn text_blob_targets_are_split() {
        let targets = RawTargets::Text("+1555 123 4567\n+15557654321,".into());
        assert_eq!(targets.entries(), vec!["+1555 123 4567", "+15557654321", ""]);

        let list = RawTargets::List(vec!["1,2".into(), "3".into()]);
        assert_eq!(list.entries(), vec!["1", "2", "3"]);
    }

    #[rstest]
    #[case::unknown_type(r#"{"type":"PING"}"#)]
    #[case::no_type(r#"{"data":{}}"#)]
    #[case::not_json("start please")]
    fn unknown_messages_are_rejected(#[case] raw: &str) {
        let response = channel().handle_json(raw);
        assert_eq!(response, ControlResponse::rejected(UNKNOWN_MESSAGE_TYPE));
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_already_processing() {
        let channel = channel();
        let start = r#"{"type":"START_BULK_SEND","data":{"targets":"+15551234567","payload":"hi","delayMs":5000}}"#;
        assert_eq!(channel.handle_json(start), ControlResponse::ok());
        assert_eq!(
            channel.handle_json(start),
            ControlResponse::rejected("Already processing")
        );
        assert_eq!(
            channel.handle_json(r#"{"type":"STOP_BULK_SEND"}"#),
            ControlResponse::ok()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_start_reports_decode_error() {
        let response = channel()
            .handle_json(r#"{"type":"START_BULK_SEND","data":{"payload":"hi","delayMs":5000}}"#);
        assert!(!response.success);
        assert_ne!(response.error.as_deref(), Some(UNKNOWN_MESSAGE_TYPE));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_job_is_rejected_with_reason() {
        let response = channel().handle(ControlRequest::StartBulkSend(StartBulkSend {
            targets: RawTargets::List(vec!["+15551234567".into()]),
            payload: "hi".into(),
            delay_ms: 1_000,
        }));
        assert!(!response.success);
        assert!(response.error.unwrap().contains("delay"));
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_channel_answers_requests() {
        let client = channel().spawn();
        let response = client.request(ControlRequest::StopBulkSend).await.unwrap();
        assert_eq!(response, ControlResponse::ok());
    }
}
