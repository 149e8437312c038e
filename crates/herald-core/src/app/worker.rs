//! Delivery Worker - 1 target 分の attempt サイクル
//!
//! # フロー（1 attempt）
//! 1. ContextProvider::open() で新しい context を取得し、interactive-ready まで polling
//! 2. ContentInjector で payload を入れる
//! 3. baseline を観測してから Submitter で送信
//! 4. Verifier の判定を Outcome にする
//!
//! attempt 全体は `tokio::time::timeout` の下で走り、どの経路で抜けても context は
//! ちょうど 1 回 release されます。adapter の panic も `Unverified` として扱います。
//! 失敗時は Decider が retry / finalize を決めます。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};

use super::cancel::CancelToken;
use super::config::EngineConfig;
use super::injector::ContentInjector;
use super::poll::{PollError, Probe, poll_until};
use super::submitter::Submitter;
use super::verifier::{HeuristicVerifier, Verifier};
use crate::domain::{
    AttemptRecord, AttemptState, Decider, Decision, DeliveryError, DeliveryReport, Outcome,
    Payload, RetryDecider, RetryPolicy, Target, Verdict, request_address,
};
use crate::ports::{
    Clock, ContextProvider, ContextRequest, IdGenerator, SurfaceCondition, SurfaceContext,
    SystemClock, UlidGenerator,
};

pub struct DeliveryWorker {
    provider: Arc<dyn ContextProvider>,
    verifier: Arc<dyn Verifier>,
    decider: Arc<dyn Decider>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    injector: ContentInjector,
    submitter: Submitter,
    surface_base: String,
    attempt_timeout: Duration,
    ready_initial_delay: Duration,
    ready: RetryPolicy,
    pre_submit_settle: Duration,
}

impl DeliveryWorker {
    pub fn new(config: &EngineConfig, provider: Arc<dyn ContextProvider>) -> Self {
        let polling = &config.polling;
        Self {
            provider,
            verifier: Arc::new(HeuristicVerifier::from_config(polling)),
            decider: Arc::new(RetryDecider::new(config.attempt_retry_policy())),
            ids: Arc::new(UlidGenerator::new(SystemClock)),
            clock: Arc::new(SystemClock),
            injector: ContentInjector::from_config(polling),
            submitter: Submitter::new(polling.send_control.clone()),
            surface_base: config.surface_base.trim_end_matches('/').to_string(),
            attempt_timeout: config.attempt_timeout(),
            ready_initial_delay: Duration::from_millis(polling.ready_initial_delay_ms),
            ready: polling.ready.clone(),
            pre_submit_settle: Duration::from_millis(polling.pre_submit_settle_ms),
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = decider;
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run attempts against `target` until one is `Sent` or the decider gives up.
    ///
    /// A stop request is honoured between attempts only; the target then finalizes
    /// with its last outcome.
    pub async fn deliver(
        &self,
        target: &Target,
        payload: &Payload,
        cancel: &CancelToken,
    ) -> DeliveryReport {
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        loop {
            let number = attempts.len() as u32 + 1;
            let (record, result) = self.run_attempt(target, payload, number, cancel).await;
            attempts.push(record);

            let error = match result {
                Ok(()) => {
                    info!(%target, attempts = number, "sent");
                    return DeliveryReport {
                        target: target.clone(),
                        outcome: Outcome::Sent,
                        attempts,
                    };
                }
                Err(error) => error,
            };

            match self.decider.decide(number, &error) {
                Decision::Retry { delay, reason } => {
                    if cancel.is_cancelled() || !cancel.sleep(delay).await {
                        info!(%target, attempts = number, "stopped before retry");
                        return finalized(target, &error, attempts);
                    }
                    debug!(%target, %reason, "retrying");
                }
                Decision::Finalize { reason } => {
                    warn!(%target, attempts = number, %reason, "target failed");
                    return finalized(target, &error, attempts);
                }
            }
        }
    }

    async fn run_attempt(
        &self,
        target: &Target,
        payload: &Payload,
        number: u32,
        cancel: &CancelToken,
    ) -> (AttemptRecord, Result<(), DeliveryError>) {
        let attempt_id = self.ids.generate_attempt_id();
        let started_at = self.clock.now();
        let started = Instant::now();
        let span = info_span!("attempt", %attempt_id, %target, number);

        let request = ContextRequest {
            attempt_id,
            target: target.clone(),
            payload: payload.clone(),
            address: request_address(&self.surface_base, target, payload),
        };

        let mut slot: Option<Box<dyn SurfaceContext>> = None;
        let mut state = AttemptState::Start;
        let body =
            AssertUnwindSafe(self.drive(request, &mut slot, &mut state, cancel)).catch_unwind();
        let deadline = tokio::time::timeout(self.attempt_timeout, body)
            .instrument(span.clone())
            .await;
        let result = match deadline {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => {
                let message = panic_message(&*panic);
                warn!(parent: &span, panic = %message, "attempt panicked");
                Err(DeliveryError::Unverified(format!("surface adapter panicked: {message}")))
            }
            Err(_) => Err(DeliveryError::TimedOut(self.attempt_timeout)),
        };

        if let Some(ctx) = slot.take() {
            if let Err(fault) = ctx.release().await {
                warn!(parent: &span, error = %fault, "context release failed");
            }
        }

        if let Err(error) = &result {
            debug!(parent: &span, reached = ?state, %error, "attempt failed");
        }

        let record = AttemptRecord {
            attempt_id,
            target: target.clone(),
            number,
            reached: state,
            outcome: match &result {
                Ok(()) => Outcome::Sent,
                Err(error) => error.outcome(),
            },
            error: result.as_ref().err().map(|e| e.to_string()),
            started_at,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        (record, result)
    }

    /// The attempt body. Whatever it opens is left in `slot` for the caller to release.
    async fn drive(
        &self,
        request: ContextRequest,
        slot: &mut Option<Box<dyn SurfaceContext>>,
        state: &mut AttemptState,
        cancel: &CancelToken,
    ) -> Result<(), DeliveryError> {
        let payload = request.payload.clone();
        let opened = self
            .provider
            .open(request)
            .await
            .map_err(|fault| DeliveryError::ContextUnavailable(fault.0))?;
        let ctx: &dyn SurfaceContext = &**slot.insert(opened);

        self.await_ready(ctx, cancel).await?;
        advance(state, AttemptState::ContextAcquired);

        let strategy = self.injector.inject(ctx, &payload).await?;
        advance(state, AttemptState::ContentInjected);

        tokio::time::sleep(self.pre_submit_settle).await;
        let baseline = ctx.observe().await?;
        let method = self.submitter.submit(ctx).await?;
        advance(state, AttemptState::Submitted);
        debug!(%strategy, %method, "submitted");

        advance(state, AttemptState::Verifying);
        let report = self.verifier.verify(ctx, &payload, &baseline).await;
        debug!(verdict = ?report.verdict, score = report.score, signals = ?report.signals, "verified");

        match report.verdict {
            Verdict::Sent => {
                advance(state, AttemptState::Succeeded);
                Ok(())
            }
            Verdict::Failed => Err(DeliveryError::Unverified(
                "payload still in content area after submission".to_string(),
            )),
            Verdict::Unverified => Err(DeliveryError::Unverified(report.fault.unwrap_or_else(
                || format!("insufficient evidence (score {})", report.score),
            ))),
        }
    }

    async fn await_ready(
        &self,
        ctx: &dyn SurfaceContext,
        cancel: &CancelToken,
    ) -> Result<(), DeliveryError> {
        if !cancel.sleep(self.ready_initial_delay).await {
            return Err(DeliveryError::ContextUnavailable("stopped".to_string()));
        }
        let ready = poll_until(&self.ready, cancel, |n| async move {
            match ctx.condition().await {
                Ok(SurfaceCondition::Ready) => Probe::Ready(()),
                Ok(SurfaceCondition::Loading) => {
                    debug!(check = n, "surface still loading");
                    Probe::Pending
                }
                Ok(SurfaceCondition::Error(reason)) => {
                    Probe::Abort(DeliveryError::SurfaceError(reason))
                }
                Err(fault) => Probe::Abort(fault.into()),
            }
        })
        .await;

        ready.map_err(|e| match e {
            PollError::Exhausted { attempts } => {
                DeliveryError::ContextUnavailable(format!("not ready after {attempts} checks"))
            }
            PollError::Cancelled => DeliveryError::ContextUnavailable("stopped".to_string()),
            PollError::Aborted(error) => error,
        })
    }
}

fn advance(state: &mut AttemptState, next: AttemptState) {
    debug_assert!(state.can_transition_to(next), "{state:?} -> {next:?}");
    debug!(from = ?*state, to = ?next, "attempt state");
    *state = next;
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn finalized(target: &Target, error: &DeliveryError, attempts: Vec<AttemptRecord>) -> DeliveryReport {
    DeliveryReport {
        target: target.clone(),
        outcome: error.outcome(),
        attempts,
    }
}
