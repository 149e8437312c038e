//! StatusSink port - ステータスイベントの出口
//!
//! `emit` は同期関数です。Orchestrator は完了イベントの送出と Idle への遷移を
//! 同じロックの中で行うため、ここで await できてはいけません。

use crate::domain::StatusEvent;

/// StatusSink は progress / completion イベントを受け取る
///
/// # 実装
/// - ChannelSink: tokio mpsc へ流す（Status Channel 用）
/// - TracingSink: ログに出すだけ
/// - RecordingSink: テスト用に全イベントを保持
pub trait StatusSink: Send + Sync {
    fn emit(&self, event: StatusEvent);
}
