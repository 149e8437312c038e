//! Bounded polling with backoff.
//!
//! One combinator for every "check, wait, check again" loop in an attempt:
//! context readiness, send-control lookup, content-area lookup and verification.

use std::future::Future;

use super::cancel::CancelToken;
use crate::domain::RetryPolicy;

/// Result of one probe.
#[derive(Debug)]
pub enum Probe<T, E> {
    /// Condition reached.
    Ready(T),

    /// Not yet; wait and probe again.
    Pending,

    /// Stop polling now, the condition can never be reached.
    Abort(E),
}

#[derive(Debug, thiserror::Error)]
pub enum PollError<E> {
    #[error("condition not reached after {attempts} probes")]
    Exhausted { attempts: u32 },

    #[error("cancelled")]
    Cancelled,

    #[error("aborted: {0}")]
    Aborted(E),
}

/// Probe until `Ready`, `Abort`, cancellation or `policy.max_attempts` probes.
///
/// `probe` receives the 1-indexed probe number. At least one probe is always made.
pub async fn poll_until<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancelToken,
    mut probe: F,
) -> Result<T, PollError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Probe<T, E>>,
{
    let mut attempts = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }
        attempts += 1;
        match probe(attempts).await {
            Probe::Ready(value) => return Ok(value),
            Probe::Abort(e) => return Err(PollError::Aborted(e)),
            Probe::Pending => {}
        }
        if policy.is_exhausted(attempts) {
            return Err(PollError::Exhausted { attempts });
        }
        if !cancel.sleep(policy.next_delay(attempts)).await {
            return Err(PollError::Cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::cancel::StopSignal;
    use std::time::Duration;

    fn policy(max: u32) -> RetryPolicy {
        RetryPolicy::constant(max, Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn returns_first_ready_value() {
        let result: Result<u32, PollError<()>> =
            poll_until(&policy(5), &CancelToken::never(), |n| async move {
                if n == 3 { Probe::Ready(n) } else { Probe::Pending }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_budget() {
        let started = tokio::time::Instant::now();
        let result: Result<(), PollError<()>> =
            poll_until(&policy(4), &CancelToken::never(), |_| async { Probe::Pending }).await;

        assert!(matches!(result, Err(PollError::Exhausted { attempts: 4 })));
        // 4 probes, 3 waits in between
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn abort_stops_immediately() {
        let result: Result<(), PollError<&str>> =
            poll_until(&policy(10), &CancelToken::never(), |_| async { Probe::Abort("blocked") })
                .await;
        assert!(matches!(result, Err(PollError::Aborted("blocked"))));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_prevents_probing() {
        let signal = StopSignal::new();
        signal.stop();
        let result: Result<(), PollError<()>> =
            poll_until(&policy(3), &signal.token(), |_| async { Probe::Ready(()) }).await;
        assert!(matches!(result, Err(PollError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_budget_still_probes_once() {
        let result: Result<(), PollError<()>> =
            poll_until(&policy(0), &CancelToken::never(), |_| async { Probe::Ready(()) }).await;
        assert!(result.is_ok());
    }
}
