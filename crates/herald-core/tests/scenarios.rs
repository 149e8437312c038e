//! End-to-end orchestrator scenarios against the scripted surface.
//!
//! All tests run on paused tokio time, so the 5 s delays and 2 s settles are instant
//! but still ordered exactly as in real time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use herald_core::app::{
    EngineBuilder, EngineConfig, Orchestrator, VerificationReport, Verifier,
};
use herald_core::domain::{
    JobLimits, JobSpec, Payload, SendComplete, SendProgress, StatusEvent, SubmitError, Target,
    TargetList, Verdict,
};
use herald_core::impls::{ChannelSink, ContextLedger, ScriptedProvider, SurfaceScript};
use herald_core::ports::{SurfaceContext, SurfaceObservation};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;

struct Harness {
    orchestrator: Orchestrator,
    events: UnboundedReceiver<StatusEvent>,
    ledger: ContextLedger,
}

impl Harness {
    fn new(provider: ScriptedProvider) -> Self {
        Self::with(provider, |b| b)
    }

    fn with(
        provider: ScriptedProvider,
        configure: impl FnOnce(EngineBuilder) -> EngineBuilder,
    ) -> Self {
        let ledger = provider.ledger();
        let (sink, events) = ChannelSink::new();
        let builder = EngineBuilder::new()
            .config(EngineConfig::default())
            .provider(Arc::new(provider))
            .sink(Arc::new(sink));
        let orchestrator = configure(builder).build().unwrap();
        Self {
            orchestrator,
            events,
            ledger,
        }
    }

    async fn next_event(&mut self) -> StatusEvent {
        self.events.recv().await.expect("sink dropped")
    }

    /// Collect events up to and including the completion event.
    async fn run_to_completion(&mut self) -> Vec<StatusEvent> {
        let mut seen = Vec::new();
        loop {
            let event = self.next_event().await;
            let done = event.is_complete();
            seen.push(event);
            if done {
                return seen;
            }
        }
    }
}

fn target(raw: &str) -> Target {
    Target::parse(raw).unwrap()
}

fn job(targets: &[&str], delay_ms: u64) -> JobSpec {
    JobSpec::new(targets.iter().copied(), "hi", delay_ms, &JobLimits::default()).unwrap()
}

struct NeverConfirms;

#[async_trait]
impl Verifier for NeverConfirms {
    async fn verify(
        &self,
        _ctx: &dyn SurfaceContext,
        _payload: &Payload,
        _baseline: &SurfaceObservation,
    ) -> VerificationReport {
        VerificationReport {
            verdict: Verdict::Unverified,
            score: 0,
            signals: Vec::new(),
            fault: None,
        }
    }
}

#[tokio::test(start_paused = true)]
async fn single_target_success_emits_one_progress_then_completion() {
    let mut h = Harness::new(ScriptedProvider::new(SurfaceScript::delivering()));
    h.orchestrator.submit(job(&["+15551234567"], 5_000)).unwrap();

    let events = h.run_to_completion().await;
    assert_eq!(
        events,
        vec![
            StatusEvent::SendProgress(SendProgress {
                sent: 1,
                failed: 0,
                current: 1,
                total: 1,
                current_target: target("+15551234567"),
            }),
            StatusEvent::SendComplete(SendComplete {
                sent: 1,
                failed: 0,
                total: 1,
            }),
        ]
    );
    assert!(h.orchestrator.status().is_idle());
    assert!(h.ledger.all_released_once());
}

#[tokio::test(start_paused = true)]
async fn never_confirmed_target_is_tried_max_attempts_times() {
    let mut h = Harness::with(ScriptedProvider::default(), |b| {
        b.verifier(Arc::new(NeverConfirms))
    });
    h.orchestrator.submit(job(&["+15551234567"], 5_000)).unwrap();

    let events = h.run_to_completion().await;
    assert_eq!(
        events.last(),
        Some(&StatusEvent::SendComplete(SendComplete {
            sent: 0,
            failed: 1,
            total: 1,
        }))
    );
    assert_eq!(h.ledger.opened(), 3);
    assert!(h.ledger.all_released_once());
}

#[tokio::test(start_paused = true)]
async fn stop_after_first_target_completes_with_partial_stats() {
    let mut h = Harness::new(ScriptedProvider::default());
    h.orchestrator
        .submit(job(&["+15551111111", "+15552222222", "+15553333333"], 5_000))
        .unwrap();

    let first = h.next_event().await;
    assert!(matches!(first, StatusEvent::SendProgress(ref p) if p.current == 1));
    h.orchestrator.stop();

    let rest = h.run_to_completion().await;
    assert_eq!(
        rest,
        vec![StatusEvent::SendComplete(SendComplete {
            sent: 1,
            failed: 0,
            total: 3,
        })]
    );
    assert_eq!(h.ledger.opened(), 1);
    assert!(h.orchestrator.status().is_idle());
}

#[tokio::test(start_paused = true)]
async fn stop_interrupts_inter_target_delay() {
    let mut h = Harness::new(ScriptedProvider::default());
    h.orchestrator
        .submit(job(&["+15551111111", "+15552222222"], 300_000))
        .unwrap();

    h.next_event().await;
    let stopped_at = Instant::now();
    h.orchestrator.stop();
    h.run_to_completion().await;
    assert_eq!(stopped_at.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn stop_during_readiness_finalizes_the_current_target_as_failed() {
    let mut h = Harness::new(ScriptedProvider::default());
    h.orchestrator
        .submit(job(&["+15551111111", "+15552222222", "+15553333333"], 5_000))
        .unwrap();

    // the first context is still inside its 2 s readiness wait
    tokio::time::sleep(Duration::from_secs(1)).await;
    h.orchestrator.stop();

    let events = h.run_to_completion().await;
    assert_eq!(
        events,
        vec![
            StatusEvent::SendProgress(SendProgress {
                sent: 0,
                failed: 1,
                current: 1,
                total: 3,
                current_target: target("+15551111111"),
            }),
            StatusEvent::SendComplete(SendComplete {
                sent: 0,
                failed: 1,
                total: 3,
            }),
        ]
    );
    let records = h.ledger.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].submitted_at.is_none());
    assert!(h.ledger.all_released_once());
}

#[tokio::test(start_paused = true)]
async fn submit_while_running_is_rejected_without_touching_the_job() {
    let mut h = Harness::new(ScriptedProvider::default());
    let running = h
        .orchestrator
        .submit(job(&["+15551111111", "+15552222222"], 5_000))
        .unwrap();

    let second = h.orchestrator.submit(job(&["+15559999999"], 5_000));
    assert_eq!(second, Err(SubmitError::AlreadyRunning));
    let raw = h.orchestrator.submit_raw(["+15559999999"], "hi", 5_000);
    assert_eq!(raw, Err(SubmitError::AlreadyRunning));

    let events = h.run_to_completion().await;
    assert_eq!(
        events.last(),
        Some(&StatusEvent::SendComplete(SendComplete {
            sent: 2,
            failed: 0,
            total: 2,
        }))
    );
    assert!(
        h.ledger
            .records()
            .iter()
            .all(|r| r.target != target("+15559999999"))
    );
    assert_ne!(
        h.orchestrator.submit(job(&["+15559999999"], 5_000)).unwrap(),
        running
    );
}

#[tokio::test(start_paused = true)]
async fn completion_event_allows_immediate_resubmission() {
    let mut h = Harness::new(ScriptedProvider::default());
    h.orchestrator.submit(job(&["+15551234567"], 5_000)).unwrap();
    h.run_to_completion().await;
    assert!(h.orchestrator.submit(job(&["+15551234567"], 5_000)).is_ok());
    h.run_to_completion().await;
    assert_eq!(h.ledger.opened(), 2);
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent_and_a_no_op_when_idle() {
    let mut h = Harness::new(ScriptedProvider::default());
    h.orchestrator.stop();
    assert!(h.orchestrator.status().is_idle());

    h.orchestrator.submit(job(&["+15551234567"], 5_000)).unwrap();
    h.orchestrator.stop();
    h.orchestrator.stop();
    let events = h.run_to_completion().await;
    assert_eq!(events.iter().filter(|e| e.is_complete()).count(), 1);

    h.orchestrator.stop();
    assert!(h.orchestrator.status().is_idle());
}

#[tokio::test(start_paused = true)]
async fn targets_are_sequenced_by_the_delay() {
    let delay = Duration::from_millis(7_500);
    let mut h = Harness::new(ScriptedProvider::default());
    let targets = ["+15551111111", "+15552222222", "+15553333333"];
    h.orchestrator
        .submit(job(&targets, delay.as_millis() as u64))
        .unwrap();
    h.run_to_completion().await;

    let records = h.ledger.records();
    assert_eq!(records.len(), 3);
    for (i, raw) in targets.iter().enumerate() {
        assert_eq!(records[i].target, target(raw));
    }
    for pair in records.windows(2) {
        let concluded = pair[0].released_at.unwrap();
        assert!(pair[1].opened_at >= concluded + delay);
    }
}

#[tokio::test(start_paused = true)]
async fn statistics_never_exceed_total() {
    let provider = ScriptedProvider::default()
        .script_for("+15552222222", SurfaceScript::rejecting("invalid number"))
        .script_for("+15553333333", SurfaceScript::swallowing());
    let mut h = Harness::new(provider);
    h.orchestrator
        .submit(job(&["+15551111111", "+15552222222", "+15553333333"], 5_000))
        .unwrap();

    let events = h.run_to_completion().await;
    for event in &events {
        match event {
            StatusEvent::SendProgress(p) => assert!(p.sent + p.failed <= p.total),
            StatusEvent::SendComplete(c) => {
                assert_eq!(
                    *c,
                    SendComplete {
                        sent: 1,
                        failed: 2,
                        total: 3,
                    }
                );
            }
        }
    }
    // the rejected target is not retried, the swallowing one is
    assert_eq!(h.ledger.for_target(&target("+15552222222")).len(), 1);
    assert_eq!(h.ledger.for_target(&target("+15553333333")).len(), 3);
    assert!(h.ledger.all_released_once());
}

#[tokio::test(start_paused = true)]
async fn hung_surfaces_time_out_and_release_their_context() {
    let provider = ScriptedProvider::new(SurfaceScript::hanging(Duration::from_secs(600)));
    let mut h = Harness::new(provider);
    let started = Instant::now();
    h.orchestrator.submit(job(&["+15551234567"], 5_000)).unwrap();

    let events = h.run_to_completion().await;
    assert_eq!(
        events.last(),
        Some(&StatusEvent::SendComplete(SendComplete {
            sent: 0,
            failed: 1,
            total: 1,
        }))
    );
    // 3 x 30 s deadlines + 2 s and 4 s backoff
    assert_eq!(started.elapsed(), Duration::from_secs(96));
    assert_eq!(h.ledger.opened(), 3);
    assert!(h.ledger.all_released_once());
}

#[test]
fn duplicate_spellings_collapse_to_one_target() {
    let list = TargetList::normalize(["+1234567", "1234567", "+1234567"]);
    assert_eq!(list.targets, vec![target("+1234567")]);
    assert_eq!(list.duplicates, 2);

    let job = JobSpec::from_targets(list, Payload::new("hi"), 5_000, &JobLimits::default()).unwrap();
    assert_eq!(job.len(), 1);
}
