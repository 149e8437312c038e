//! herald-core
//!
//! Bulk delivery orchestration against an uncontrolled interactive surface.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, target, payload, job, attempt, outcome, decision, errors, events）
//! - **ports**: 抽象化レイヤー（ContextProvider / SurfaceContext, StatusSink, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（orchestrator, worker, injector, verifier, channel, config, builder）
//! - **impls**: 実装（ScriptedProvider, ChannelSink など開発用）
//! - **observability**: tracing の初期化

pub mod app;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
