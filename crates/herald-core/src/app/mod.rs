//! App - アプリケーション層
//!
//! ports を組み合わせて配信エンジンを実装します。
//!
//! # 主要コンポーネント
//! - **Orchestrator**: job の受付、target の逐次処理、統計、イベント送出
//! - **DeliveryWorker**: 1 target 分の attempt サイクル（timeout / retry 込み）
//! - **ContentInjector / Submitter / Verifier**: attempt の各段階
//! - **StatusChannel**: 制御面とのメッセージ境界
//! - **EngineBuilder**: 構築とワイヤリング

pub mod builder;
pub mod cancel;
pub mod channel;
pub mod config;
pub mod injector;
pub mod orchestrator;
pub mod poll;
pub mod submitter;
pub mod verifier;
pub mod worker;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, EngineBuilder};
pub use self::cancel::{CancelToken, StopSignal};
pub use self::channel::{
    ChannelClosed, ControlClient, ControlRequest, ControlResponse, RawTargets, StartBulkSend,
    StatusChannel,
};
pub use self::config::{AttemptConfig, ConfigError, EngineConfig, PollingConfig};
pub use self::injector::{ContentInjector, InjectionStrategy};
pub use self::orchestrator::{Orchestrator, OrchestratorStatus};
pub use self::poll::{PollError, Probe, poll_until};
pub use self::submitter::{SubmitMethod, Submitter};
pub use self::verifier::{HeuristicVerifier, Signal, VerificationReport, Verifier, judge};
pub use self::worker::DeliveryWorker;
