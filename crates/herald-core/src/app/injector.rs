//! Content Injector - payload を content area に入れる
//!
//! surface 側のエディタは素直に値を受け付けるとは限らないので、戦略を固定順で
//! 試し、content area が payload を保持した最初の戦略で止めます。

use std::fmt;
use std::time::Duration;

use tracing::debug;

use super::cancel::CancelToken;
use super::config::PollingConfig;
use super::poll::{PollError, Probe, poll_until};
use crate::domain::{DeliveryError, Payload, RetryPolicy, SurfaceFault};
use crate::ports::{CHANGE_SIGNALS, InputSignal, SurfaceContext};

/// Injection strategies in trial order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InjectionStrategy {
    /// Assign the plain text value in one go.
    BulkAssign,

    /// Assign a single escaped text-run element in the editor's own markup.
    StructuredMarkup,

    /// Select all, then the surface's native insert-text command.
    NativeReplace,

    /// One character at a time with input notifications in between.
    SimulatedTyping,
}

impl InjectionStrategy {
    pub const ORDER: [InjectionStrategy; 4] = [
        InjectionStrategy::BulkAssign,
        InjectionStrategy::StructuredMarkup,
        InjectionStrategy::NativeReplace,
        InjectionStrategy::SimulatedTyping,
    ];
}

impl fmt::Display for InjectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InjectionStrategy::BulkAssign => "bulk_assign",
            InjectionStrategy::StructuredMarkup => "structured_markup",
            InjectionStrategy::NativeReplace => "native_replace",
            InjectionStrategy::SimulatedTyping => "simulated_typing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ContentInjector {
    locate: RetryPolicy,
    strategy_settle: Duration,
    typing_interval: Duration,
    typing_budget: Duration,
}

impl ContentInjector {
    pub fn new(locate: RetryPolicy, strategy_settle: Duration, typing_interval: Duration) -> Self {
        Self {
            locate,
            strategy_settle,
            typing_interval,
            typing_budget: Duration::MAX,
        }
    }

    pub fn from_config(polling: &PollingConfig) -> Self {
        Self::new(
            polling.content_area.clone(),
            Duration::from_millis(polling.strategy_settle_ms),
            Duration::from_millis(polling.typing_interval_ms),
        )
        .with_typing_budget(Duration::from_millis(polling.typing_budget_ms))
    }

    /// Cap the total pause time of simulated typing.
    pub fn with_typing_budget(mut self, budget: Duration) -> Self {
        self.typing_budget = budget;
        self
    }

    /// Pause between keystrokes for a payload of `chars` characters.
    pub fn keystroke_interval(&self, chars: usize) -> Duration {
        let chars = u32::try_from(chars.max(1)).unwrap_or(u32::MAX);
        self.typing_interval.min(self.typing_budget / chars)
    }

    /// Place `payload` into the content area. Returns the strategy that worked.
    pub async fn inject(
        &self,
        ctx: &dyn SurfaceContext,
        payload: &Payload,
    ) -> Result<InjectionStrategy, DeliveryError> {
        let located = poll_until(&self.locate, &CancelToken::never(), |_| async move {
            match ctx.locate_content_area().await {
                Ok(true) => Probe::Ready(()),
                Ok(false) => Probe::Pending,
                Err(fault) => Probe::Abort(fault),
            }
        })
        .await;
        match located {
            Ok(()) => {}
            Err(PollError::Aborted(fault)) => return Err(fault.into()),
            Err(_) => {
                debug!("content area not found");
                return Err(DeliveryError::InjectionFailed);
            }
        }

        for strategy in InjectionStrategy::ORDER {
            match self.try_strategy(ctx, strategy, payload).await {
                Ok(true) => {
                    debug!(%strategy, "content injected");
                    return Ok(strategy);
                }
                Ok(false) => debug!(%strategy, "strategy did not take"),
                Err(fault) => debug!(%strategy, error = %fault, "strategy faulted"),
            }
        }
        Err(DeliveryError::InjectionFailed)
    }

    async fn try_strategy(
        &self,
        ctx: &dyn SurfaceContext,
        strategy: InjectionStrategy,
        payload: &Payload,
    ) -> Result<bool, SurfaceFault> {
        if !self.apply(ctx, strategy, payload.as_str()).await? {
            return Ok(false);
        }
        ctx.dispatch(&CHANGE_SIGNALS).await?;
        tokio::time::sleep(self.strategy_settle).await;
        let content = ctx.content_text().await?;
        Ok(content.is_some_and(|c| c.contains(payload.as_str())))
    }

    /// `Ok(false)` when the strategy is not available on this surface.
    async fn apply(
        &self,
        ctx: &dyn SurfaceContext,
        strategy: InjectionStrategy,
        text: &str,
    ) -> Result<bool, SurfaceFault> {
        match strategy {
            InjectionStrategy::BulkAssign => {
                ctx.assign_text(text).await?;
                Ok(true)
            }
            InjectionStrategy::StructuredMarkup => {
                ctx.assign_markup(&text_run_markup(text)).await?;
                Ok(true)
            }
            InjectionStrategy::NativeReplace => ctx.replace_text_natively(text).await,
            InjectionStrategy::SimulatedTyping => {
                let interval = self.keystroke_interval(text.chars().count());
                ctx.assign_text("").await?;
                for ch in text.chars() {
                    ctx.append_char(ch).await?;
                    ctx.dispatch(&[InputSignal::Input, InputSignal::KeyUp]).await?;
                    tokio::time::sleep(interval).await;
                }
                Ok(true)
            }
        }
    }
}

/// `<span data-lexical-text="true">…</span>` with `text` HTML-escaped.
pub fn text_run_markup(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    format!(r#"<span data-lexical-text="true">{escaped}</span>"#)
}
