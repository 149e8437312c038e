//! Outcome Verifier - 送信後の画面状態から tri-state の判定を出す
//!
//! surface には ack がないので、個々には当てにならない signal を重み付きで集めます。
//!
//! | signal                                   | weight |
//! |------------------------------------------|--------|
//! | content area is empty                    | 1      |
//! | new outbound marker vs. baseline         | 3      |
//! | new delivery/read status marker          | 3      |
//! | last entries (up to 3) are all outbound  | 2      |
//!
//! - `Sent`: content area empty AND at least one structural signal
//! - `Failed`: content area still holds the payload AND no structural signal
//! - `Unverified`: anything else
//!
//! Leaving the request address is not treated as a signal.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::cancel::CancelToken;
use super::config::PollingConfig;
use super::poll::{Probe, poll_until};
use crate::domain::{Payload, RetryPolicy, Verdict};
use crate::ports::{EntryDirection, SurfaceContext, SurfaceObservation};

/// How many trailing conversation entries the recency signal looks at.
pub const RECENT_WINDOW: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    ContentCleared,
    NewOutboundMarker,
    NewStatusMarker,
    RecentOutbound,
}

impl Signal {
    pub fn weight(self) -> u32 {
        match self {
            Signal::ContentCleared => 1,
            Signal::NewOutboundMarker | Signal::NewStatusMarker => 3,
            Signal::RecentOutbound => 2,
        }
    }

    pub fn is_structural(self) -> bool {
        !matches!(self, Signal::ContentCleared)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub verdict: Verdict,
    pub score: u32,
    pub signals: Vec<Signal>,

    /// Set when the surface could not be observed at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

impl VerificationReport {
    fn faulted(message: String) -> Self {
        Self {
            verdict: Verdict::Unverified,
            score: 0,
            signals: Vec::new(),
            fault: Some(message),
        }
    }
}

/// Score one observation against the pre-submission baseline.
///
/// `content` is `None` when the content area is gone.
pub fn judge(
    content: Option<&str>,
    payload: &Payload,
    baseline: &SurfaceObservation,
    current: &SurfaceObservation,
) -> VerificationReport {
    let mut signals = Vec::new();

    let cleared = content.is_some_and(|c| c.trim().is_empty());
    if cleared {
        signals.push(Signal::ContentCleared);
    }
    if current.outbound_markers > baseline.outbound_markers {
        signals.push(Signal::NewOutboundMarker);
    }
    if current.status_markers > baseline.status_markers {
        signals.push(Signal::NewStatusMarker);
    }
    if current.recent.len() > baseline.recent.len() && recent_all_outbound(&current.recent) {
        signals.push(Signal::RecentOutbound);
    }

    let structural = signals.iter().any(|s| s.is_structural());
    let still_holds_payload = content.is_some_and(|c| c.contains(payload.as_str()));

    let verdict = if cleared && structural {
        Verdict::Sent
    } else if still_holds_payload && !structural {
        Verdict::Failed
    } else {
        Verdict::Unverified
    };

    VerificationReport {
        verdict,
        score: signals.iter().map(|s| s.weight()).sum(),
        signals,
        fault: None,
    }
}

fn recent_all_outbound(recent: &[EntryDirection]) -> bool {
    let tail = &recent[recent.len().saturating_sub(RECENT_WINDOW)..];
    !tail.is_empty() && tail.iter().all(|d| *d == EntryDirection::Outbound)
}

/// Judges whether a submission took.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(
        &self,
        ctx: &dyn SurfaceContext,
        payload: &Payload,
        baseline: &SurfaceObservation,
    ) -> VerificationReport;
}

/// Settle, then re-observe until `Sent` or the poll budget is spent.
#[derive(Debug, Clone)]
pub struct HeuristicVerifier {
    settle: Duration,
    poll: RetryPolicy,
}

impl HeuristicVerifier {
    pub fn new(settle: Duration, poll: RetryPolicy) -> Self {
        Self { settle, poll }
    }

    pub fn from_config(polling: &PollingConfig) -> Self {
        Self::new(
            Duration::from_millis(polling.verify_settle_ms),
            polling.verify.clone(),
        )
    }
}

#[async_trait]
impl Verifier for HeuristicVerifier {
    async fn verify(
        &self,
        ctx: &dyn SurfaceContext,
        payload: &Payload,
        baseline: &SurfaceObservation,
    ) -> VerificationReport {
        tokio::time::sleep(self.settle).await;

        let last_round = self.poll.max_attempts.max(1);
        let result = poll_until(&self.poll, &CancelToken::never(), |n| async move {
            let observed = async {
                let content = ctx.content_text().await?;
                let current = ctx.observe().await?;
                Ok::<_, crate::domain::SurfaceFault>(judge(
                    content.as_deref(),
                    payload,
                    baseline,
                    &current,
                ))
            }
            .await;
            match observed {
                Ok(report) if report.verdict.is_sent() || n >= last_round => Probe::Ready(report),
                Ok(report) => {
                    debug!(round = n, verdict = ?report.verdict, score = report.score, "not sent yet");
                    Probe::Pending
                }
                Err(fault) => Probe::Abort(fault),
            }
        })
        .await;

        match result {
            Ok(report) => report,
            Err(super::poll::PollError::Aborted(fault)) => VerificationReport::faulted(fault.0),
            Err(e) => VerificationReport::faulted(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AttemptId, Target, request_address};
    use crate::impls::scripted::{ScriptedProvider, SurfaceScript};
    use crate::ports::{ContextProvider, ContextRequest};
    use tokio::time::Instant;
    use ulid::Ulid;
    use EntryDirection::*;

    fn obs(outbound: usize, status: usize, recent: &[EntryDirection]) -> SurfaceObservation {
        SurfaceObservation {
            outbound_markers: outbound,
            status_markers: status,
            recent: recent.to_vec(),
        }
    }

    #[test]
    fn cleared_with_new_markers_is_sent() {
        let report = judge(
            Some(""),
            &Payload::new("hi"),
            &obs(0, 0, &[]),
            &obs(1, 1, &[Outbound]),
        );
        assert_eq!(report.verdict, Verdict::Sent);
        assert_eq!(report.score, 1 + 3 + 3 + 2);
    }

    #[test]
    fn cleared_without_structure_is_unverified() {
        let report = judge(Some("  "), &Payload::new("hi"), &obs(2, 2, &[]), &obs(2, 2, &[]));
        assert_eq!(report.verdict, Verdict::Unverified);
        assert_eq!(report.signals, vec![Signal::ContentCleared]);
    }

    #[test]
    fn payload_still_present_without_structure_is_failed() {
        let report = judge(
            Some("hi"),
            &Payload::new("hi"),
            &obs(1, 1, &[Inbound]),
            &obs(1, 1, &[Inbound]),
        );
        assert_eq!(report.verdict, Verdict::Failed);
        assert_eq!(report.score, 0);
    }

    #[test]
    fn payload_present_with_structure_is_unverified() {
        let report = judge(Some("hi"), &Payload::new("hi"), &obs(0, 0, &[]), &obs(1, 0, &[]));
        assert_eq!(report.verdict, Verdict::Unverified);
    }

    #[test]
    fn pre_existing_markers_do_not_count() {
        let history = [Outbound, Outbound, Outbound];
        let report = judge(
            Some(""),
            &Payload::new("hi"),
            &obs(3, 3, &history),
            &obs(3, 3, &history),
        );
        assert_eq!(report.verdict, Verdict::Unverified);
    }

    #[test]
    fn recency_ignores_older_inbound_entries() {
        let report = judge(
            Some(""),
            &Payload::new("hi"),
            &obs(1, 1, &[Inbound, Outbound, Outbound]),
            &obs(1, 1, &[Inbound, Outbound, Outbound, Outbound]),
        );
        assert_eq!(report.signals, vec![Signal::ContentCleared, Signal::RecentOutbound]);
        assert_eq!(report.verdict, Verdict::Sent);
    }

    #[test]
    fn missing_content_area_is_never_sent() {
        let report = judge(None, &Payload::new("hi"), &obs(0, 0, &[]), &obs(1, 1, &[Outbound]));
        assert_eq!(report.verdict, Verdict::Unverified);
    }

    /// Open a scripted context, fill it and submit. Returns the context and its baseline.
    async fn submitted(
        script: SurfaceScript,
        payload: &Payload,
    ) -> (Box<dyn SurfaceContext>, SurfaceObservation) {
        let target = Target::parse("+15551234567").unwrap();
        let ctx = ScriptedProvider::new(script)
            .open(ContextRequest {
                attempt_id: AttemptId::from(Ulid::nil()),
                address: request_address("https://surface.test", &target, payload),
                target,
                payload: payload.clone(),
            })
            .await
            .unwrap();
        ctx.assign_text(payload.as_str()).await.unwrap();
        let baseline = ctx.observe().await.unwrap();
        assert!(ctx.activate_send_control().await.unwrap());
        (ctx, baseline)
    }

    fn lagging(marker_lag: u32) -> SurfaceScript {
        SurfaceScript {
            marker_lag,
            ..SurfaceScript::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn late_markers_are_caught_on_a_later_round() {
        let payload = Payload::new("hi");
        let (ctx, baseline) = submitted(lagging(1), &payload).await;
        let verifier = HeuristicVerifier::from_config(&PollingConfig::default());

        let started = Instant::now();
        let report = verifier.verify(ctx.as_ref(), &payload, &baseline).await;
        assert_eq!(report.verdict, Verdict::Sent);
        assert!(report.signals.contains(&Signal::NewOutboundMarker));
        // 2s settle, round 1 misses, 1s poll, round 2 sees the marker
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn markers_later_than_the_budget_leave_the_attempt_unverified() {
        let payload = Payload::new("hi");
        let (ctx, baseline) = submitted(lagging(5), &payload).await;
        let verifier = HeuristicVerifier::from_config(&PollingConfig::default());

        let started = Instant::now();
        let report = verifier.verify(ctx.as_ref(), &payload, &baseline).await;
        assert_eq!(report.verdict, Verdict::Unverified);
        assert_eq!(report.signals, vec![Signal::ContentCleared]);
        assert_eq!(report.fault, None);
        // 2s settle, then 3 rounds 1s apart
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_markers_need_a_single_round() {
        let payload = Payload::new("hi");
        let (ctx, baseline) = submitted(SurfaceScript::delivering(), &payload).await;
        let verifier = HeuristicVerifier::new(
            Duration::from_millis(500),
            RetryPolicy::constant(3, Duration::from_secs(1)),
        );

        let started = Instant::now();
        let report = verifier.verify(ctx.as_ref(), &payload, &baseline).await;
        assert_eq!(report.verdict, Verdict::Sent);
        assert_eq!(started.elapsed(), Duration::from_millis(500));
    }
}
