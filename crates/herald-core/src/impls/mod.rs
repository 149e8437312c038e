//! Impls - 開発・テスト用の実装
//!
//! - **ScriptedProvider**: スクリプトで動く in-memory surface
//! - **ChannelSink / TracingSink / RecordingSink**: StatusSink の実装

pub mod scripted;
pub mod sinks;

pub use self::scripted::{
    AcceptedInput, ContextLedger, ContextRecord, ScriptedProvider, SurfaceScript,
};
pub use self::sinks::{ChannelSink, RecordingSink, TracingSink};
