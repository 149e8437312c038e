//! EngineBuilder - Orchestrator の構築とワイヤリング
//!
//! # Fail-fast 設計
//! - ContextProvider は必須。未設定なら build() が BuildError を返す
//! - 設定は build() 時に検証する（実行中に不正値で落ちない）
//! - それ以外の port は省略すると既定の実装を使う

use std::sync::Arc;

use super::config::{ConfigError, EngineConfig};
use super::orchestrator::Orchestrator;
use super::verifier::Verifier;
use super::worker::DeliveryWorker;
use crate::domain::Decider;
use crate::impls::TracingSink;
use crate::ports::{Clock, ContextProvider, IdGenerator, StatusSink, SystemClock, UlidGenerator};

/// BuildError はエンジン構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no context provider registered. Call `provider()` before `build()`.")]
    MissingProvider,

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

/// # 使用例
/// ```ignore
/// let orchestrator = EngineBuilder::new()
///     .config(EngineConfig::from_json_file("herald.json")?)
///     .provider(Arc::new(my_provider))
///     .sink(Arc::new(sink))
///     .build()?;
/// ```
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    provider: Option<Arc<dyn ContextProvider>>,
    verifier: Option<Arc<dyn Verifier>>,
    decider: Option<Arc<dyn Decider>>,
    sink: Option<Arc<dyn StatusSink>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn build(self) -> Result<Orchestrator, BuildError> {
        self.config.validate()?;
        let provider = self.provider.ok_or(BuildError::MissingProvider)?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));

        let mut worker = DeliveryWorker::new(&self.config, provider)
            .with_clock(clock)
            .with_ids(Arc::clone(&ids));
        if let Some(verifier) = self.verifier {
            worker = worker.with_verifier(verifier);
        }
        if let Some(decider) = self.decider {
            worker = worker.with_decider(decider);
        }

        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingSink));
        Ok(Orchestrator::new(worker, sink, ids, self.config.limits))
    }
}
