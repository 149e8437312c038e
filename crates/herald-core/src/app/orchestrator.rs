//! Orchestrator - job の受付と target の逐次処理
//!
//! # 不変条件
//! - active な job は高々 1 つ（`Idle | Running` の明示的な状態）
//! - target は投入順に 1 つずつ処理し、最後の target の後以外は delay を待つ
//! - 完了イベントの送出と `Idle` への遷移は同じロックの中で行う
//! - 処理タスクが panic しても、最後に publish した Statistics で完了させる
//! - Statistics を書くのは処理タスクだけ。外からは watch 経由で読む

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use tokio::sync::watch;
use tracing::{Instrument, error, info, info_span};

use super::cancel::{CancelToken, StopSignal};
use super::worker::{DeliveryWorker, panic_message};
use crate::domain::{JobId, JobLimits, JobSpec, Statistics, StatusEvent, SubmitError};
use crate::ports::{IdGenerator, StatusSink};

/// Snapshot returned by [`Orchestrator::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorStatus {
    Idle,
    Running {
        job_id: JobId,
        stats: Statistics,
        stopping: bool,
    },
}

impl OrchestratorStatus {
    pub fn is_idle(&self) -> bool {
        matches!(self, OrchestratorStatus::Idle)
    }
}

enum OrchestratorState {
    Idle,
    Running(JobHandle),
}

struct JobHandle {
    job_id: JobId,
    stop: StopSignal,
    stats: watch::Receiver<Statistics>,
}

struct Inner {
    state: Mutex<OrchestratorState>,
    worker: DeliveryWorker,
    sink: Arc<dyn StatusSink>,
    ids: Arc<dyn IdGenerator>,
    limits: JobLimits,
}

/// Cheap to clone; all clones drive the same engine.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        worker: DeliveryWorker,
        sink: Arc<dyn StatusSink>,
        ids: Arc<dyn IdGenerator>,
        limits: JobLimits,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(OrchestratorState::Idle),
                worker,
                sink,
                ids,
                limits,
            }),
        }
    }

    pub fn limits(&self) -> &JobLimits {
        &self.inner.limits
    }

    /// Accept `job` and start processing it in the background.
    ///
    /// Returns on acceptance, not on completion. Must be called from within a tokio runtime.
    pub fn submit(&self, job: JobSpec) -> Result<JobId, SubmitError> {
        let mut state = self.inner.lock_state();
        if matches!(*state, OrchestratorState::Running(_)) {
            return Err(SubmitError::AlreadyRunning);
        }

        let job_id = self.inner.ids.generate_job_id();
        let stop = StopSignal::new();
        let cancel = stop.token();
        let (stats_tx, stats_rx) = watch::channel(Statistics::new(job.len()));
        *state = OrchestratorState::Running(JobHandle {
            job_id,
            stop,
            stats: stats_rx,
        });
        drop(state);

        info!(%job_id, targets = job.len(), "job accepted");
        let inner = Arc::clone(&self.inner);
        tokio::spawn(
            async move { inner.run_job(job_id, job, stats_tx, cancel).await }
                .instrument(info_span!("job", %job_id)),
        );
        Ok(job_id)
    }

    /// Validate raw input against the configured limits, then [`submit`](Self::submit).
    pub fn submit_raw<I, S>(
        &self,
        raw_targets: I,
        payload: impl Into<String>,
        delay_ms: u64,
    ) -> Result<JobId, SubmitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !self.status().is_idle() {
            return Err(SubmitError::AlreadyRunning);
        }
        let job = JobSpec::new(raw_targets, payload, delay_ms, &self.inner.limits)?;
        self.submit(job)
    }

    /// Request cooperative cancellation of the active job. Always succeeds.
    pub fn stop(&self) {
        let state = self.inner.lock_state();
        match &*state {
            OrchestratorState::Running(handle) => {
                if handle.stop.stop() {
                    info!(job_id = %handle.job_id, "stop requested");
                }
            }
            OrchestratorState::Idle => {}
        }
    }

    pub fn status(&self) -> OrchestratorStatus {
        let state = self.inner.lock_state();
        match &*state {
            OrchestratorState::Idle => OrchestratorStatus::Idle,
            OrchestratorState::Running(handle) => OrchestratorStatus::Running {
                job_id: handle.job_id,
                stats: *handle.stats.borrow(),
                stopping: handle.stop.is_stopped(),
            },
        }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, OrchestratorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_job(
        self: Arc<Self>,
        job_id: JobId,
        job: JobSpec,
        stats_tx: watch::Sender<Statistics>,
        cancel: CancelToken,
    ) {
        let processed = AssertUnwindSafe(self.process(&job, &stats_tx, &cancel))
            .catch_unwind()
            .await;
        let stats = match processed {
            Ok(stats) => stats,
            Err(panic) => {
                let stats = *stats_tx.borrow();
                error!(
                    panic = %panic_message(&*panic),
                    sent = stats.sent,
                    failed = stats.failed,
                    "job aborted"
                );
                stats
            }
        };
        self.finish(job_id, stats);
    }

    async fn process(
        &self,
        job: &JobSpec,
        stats_tx: &watch::Sender<Statistics>,
        cancel: &CancelToken,
    ) -> Statistics {
        let total = job.len();
        let mut stats = Statistics::new(total);

        for (index, target) in job.targets().iter().enumerate() {
            if cancel.is_cancelled() {
                info!(remaining = stats.remaining(), "stopped before next target");
                break;
            }

            let report = self.worker.deliver(target, job.payload(), cancel).await;
            stats.record(report.outcome);
            stats_tx.send_replace(stats);
            info!(
                %target,
                outcome = ?report.outcome,
                attempts = report.attempt_count(),
                sent = stats.sent,
                failed = stats.failed,
                "target finalized"
            );
            self.sink
                .emit(StatusEvent::progress(stats, index + 1, target.clone()));

            if index + 1 == total {
                break;
            }
            if cancel.is_cancelled() || !cancel.sleep(job.delay()).await {
                info!(remaining = stats.remaining(), "stopped during inter-target delay");
                break;
            }
        }
        stats
    }

    fn finish(&self, job_id: JobId, stats: Statistics) {
        let mut state = self.lock_state();
        self.sink.emit(StatusEvent::complete(stats));
        if matches!(&*state, OrchestratorState::Running(handle) if handle.job_id == job_id) {
            *state = OrchestratorState::Idle;
        }
        info!(sent = stats.sent, failed = stats.failed, total = stats.total, "job complete");
    }
}
