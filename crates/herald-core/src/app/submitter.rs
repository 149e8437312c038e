//! Submission: send control first, confirm key as fallback.
//!
//! Submission is attempted, never confirmed here. Whether it took is the verifier's call.

use std::fmt;

use tracing::debug;

use super::cancel::CancelToken;
use super::poll::{PollError, Probe, poll_until};
use crate::domain::{DeliveryError, RetryPolicy};
use crate::ports::{CONFIRM_SIGNALS, SurfaceContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMethod {
    SendControl,
    ConfirmKey,
}

impl fmt::Display for SubmitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SubmitMethod::SendControl => "send_control",
            SubmitMethod::ConfirmKey => "confirm_key",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Submitter {
    send_control: RetryPolicy,
}

impl Submitter {
    pub fn new(send_control: RetryPolicy) -> Self {
        Self { send_control }
    }

    pub async fn submit(&self, ctx: &dyn SurfaceContext) -> Result<SubmitMethod, DeliveryError> {
        let clicked = poll_until(&self.send_control, &CancelToken::never(), |_| async move {
            match ctx.activate_send_control().await {
                Ok(true) => Probe::Ready(()),
                Ok(false) => Probe::Pending,
                Err(fault) => Probe::Abort(fault),
            }
        })
        .await;

        match clicked {
            Ok(()) => Ok(SubmitMethod::SendControl),
            Err(PollError::Aborted(fault)) => Err(fault.into()),
            Err(_) => {
                debug!("no usable send control, falling back to confirm key");
                ctx.dispatch(&CONFIRM_SIGNALS).await?;
                Ok(SubmitMethod::ConfirmKey)
            }
        }
    }
}
