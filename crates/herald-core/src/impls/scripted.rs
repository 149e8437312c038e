//! ScriptedProvider - in-memory surface for tests and the demo CLI.
//!
//! 各 context は [`SurfaceScript`] に従って振る舞います。target ごとにスクリプトを
//! 積んでおくと、attempt ごとに先頭から 1 つずつ消費されます（最後の 1 つは使い回し）。
//!
//! open / submit / release は [`ContextLedger`] に tokio の `Instant` 付きで記録されるので、
//! 「context は必ず 1 回だけ release される」「target 間の待ち時間」をテストで検査できます。

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::{AttemptId, SurfaceFault, Target};
use crate::ports::{
    ContextProvider, ContextRequest, EntryDirection, InputSignal, KeyPhase, SurfaceCondition,
    SurfaceContext, SurfaceObservation,
};

/// Which injection paths the content area honours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedInput {
    pub bulk: bool,
    pub markup: bool,

    /// `None`: no native replace command. `Some(false)`: command exists but has no effect.
    pub native: Option<bool>,
    pub typing: bool,
}

impl Default for AcceptedInput {
    fn default() -> Self {
        Self {
            bulk: true,
            markup: true,
            native: Some(true),
            typing: true,
        }
    }
}

/// Behaviour of one scripted context.
#[derive(Debug, Clone)]
pub struct SurfaceScript {
    /// Readiness checks answered with `Loading` before `Ready`.
    pub loading_checks: u32,

    /// Every readiness check reports this error.
    pub error: Option<String>,

    /// Every readiness check takes this long.
    pub condition_delay: Duration,

    pub has_content_area: bool,
    pub accepts: AcceptedInput,
    pub has_send_control: bool,
    pub confirm_key_sends: bool,

    /// A submission produces an outbound entry with a status marker.
    pub delivers: bool,

    /// A submission that does not deliver still empties the content area.
    pub clears_without_delivery: bool,

    /// Conversation history present when the context opens.
    pub history: Vec<EntryDirection>,

    /// Observations after a delivering submission that still show the old markers.
    pub marker_lag: u32,

    pub fault_on_observe: bool,
    pub fault_on_open: bool,

    /// Observing panics, as a buggy adapter would.
    pub panic_on_observe: bool,
}

impl Default for SurfaceScript {
    fn default() -> Self {
        Self {
            loading_checks: 0,
            error: None,
            condition_delay: Duration::ZERO,
            has_content_area: true,
            accepts: AcceptedInput::default(),
            has_send_control: true,
            confirm_key_sends: true,
            delivers: true,
            clears_without_delivery: false,
            history: Vec::new(),
            marker_lag: 0,
            fault_on_observe: false,
            fault_on_open: false,
            panic_on_observe: false,
        }
    }
}

impl SurfaceScript {
    /// A surface that delivers on the first try.
    pub fn delivering() -> Self {
        Self::default()
    }

    /// A surface that accepts the payload but never shows it as sent.
    pub fn swallowing() -> Self {
        Self {
            delivers: false,
            ..Self::default()
        }
    }

    /// A surface that reports an invalid recipient.
    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    /// A surface whose readiness check never returns within `delay`.
    pub fn hanging(delay: Duration) -> Self {
        Self {
            condition_delay: delay,
            ..Self::default()
        }
    }
}

/// One opened context, as seen from outside.
#[derive(Debug, Clone)]
pub struct ContextRecord {
    pub attempt_id: AttemptId,
    pub target: Target,
    pub address: String,
    pub opened_at: Instant,
    pub submitted_at: Option<Instant>,
    pub released_at: Option<Instant>,
    pub releases: u32,
}

/// Shared log of every context the provider opened.
#[derive(Debug, Clone, Default)]
pub struct ContextLedger {
    records: Arc<Mutex<Vec<ContextRecord>>>,
}

impl ContextLedger {
    pub fn records(&self) -> Vec<ContextRecord> {
        self.lock().clone()
    }

    /// Contexts opened for `target`, in opening order.
    pub fn for_target(&self, target: &Target) -> Vec<ContextRecord> {
        self.lock()
            .iter()
            .filter(|r| &r.target == target)
            .cloned()
            .collect()
    }

    pub fn opened(&self) -> usize {
        self.lock().len()
    }

    /// Every opened context was released exactly once.
    pub fn all_released_once(&self) -> bool {
        self.lock().iter().all(|r| r.releases == 1)
    }

    fn push(&self, record: ContextRecord) -> usize {
        let mut records = self.lock();
        records.push(record);
        records.len() - 1
    }

    fn update(&self, index: usize, f: impl FnOnce(&mut ContextRecord)) {
        if let Some(record) = self.lock().get_mut(index) {
            f(record);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ContextRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Context provider backed by scripts instead of a real surface.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    default_script: SurfaceScript,
    per_target: Mutex<HashMap<String, VecDeque<SurfaceScript>>>,
    failure_rate: f64,
    ledger: ContextLedger,
}

impl ScriptedProvider {
    pub fn new(default_script: SurfaceScript) -> Self {
        Self {
            default_script,
            ..Self::default()
        }
    }

    /// Queue `script` for the next attempt against `target` (raw or normalized form).
    pub fn script_for(self, target: &str, script: SurfaceScript) -> Self {
        let key = Target::parse(target)
            .map(|t| t.as_str().to_string())
            .unwrap_or_else(|_| target.to_string());
        self.per_target
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .push_back(script);
        self
    }

    /// Each context independently swallows its submission with this probability.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn ledger(&self) -> ContextLedger {
        self.ledger.clone()
    }

    fn next_script(&self, target: &Target) -> SurfaceScript {
        let mut per_target = self.per_target.lock().unwrap_or_else(PoisonError::into_inner);
        let mut script = match per_target.get_mut(target.as_str()) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => self.default_script.clone(),
        };
        if self.failure_rate > 0.0 && rand::random::<f64>() < self.failure_rate {
            script.delivers = false;
        }
        script
    }
}

#[async_trait]
impl ContextProvider for ScriptedProvider {
    async fn open(&self, request: ContextRequest) -> Result<Box<dyn SurfaceContext>, SurfaceFault> {
        let script = self.next_script(&request.target);
        if script.fault_on_open {
            return Err(SurfaceFault::new("browser window could not be created"));
        }
        let index = self.ledger.push(ContextRecord {
            attempt_id: request.attempt_id,
            target: request.target,
            address: request.address,
            opened_at: Instant::now(),
            submitted_at: None,
            released_at: None,
            releases: 0,
        });
        let view = ViewState {
            recent: script.history.clone(),
            outbound_markers: script
                .history
                .iter()
                .filter(|d| **d == EntryDirection::Outbound)
                .count(),
            ..ViewState::default()
        };
        Ok(Box::new(ScriptedContext {
            script,
            ledger: self.ledger.clone(),
            index,
            view: Mutex::new(view),
        }))
    }
}

#[derive(Debug, Default)]
struct ViewState {
    checks: u32,
    content: String,
    outbound_markers: usize,
    status_markers: usize,
    recent: Vec<EntryDirection>,

    /// A delivered entry not yet visible, with the observations left before it shows.
    pending_lag: Option<u32>,
}

impl ViewState {
    fn show_delivered(&mut self) {
        self.outbound_markers += 1;
        self.status_markers += 1;
        self.recent.push(EntryDirection::Outbound);
    }
}

struct ScriptedContext {
    script: SurfaceScript,
    ledger: ContextLedger,
    index: usize,
    view: Mutex<ViewState>,
}

impl ScriptedContext {
    fn view(&self) -> std::sync::MutexGuard<'_, ViewState> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn submit(&self) {
        let mut view = self.view();
        if view.content.trim().is_empty() {
            return;
        }
        if self.script.delivers {
            view.content.clear();
            if self.script.marker_lag == 0 {
                view.show_delivered();
            } else {
                view.pending_lag = Some(self.script.marker_lag);
            }
        } else if self.script.clears_without_delivery {
            view.content.clear();
        }
        drop(view);
        self.ledger.update(self.index, |r| {
            r.submitted_at.get_or_insert_with(Instant::now);
        });
    }
}

#[async_trait]
impl SurfaceContext for ScriptedContext {
    async fn condition(&self) -> Result<SurfaceCondition, SurfaceFault> {
        if !self.script.condition_delay.is_zero() {
            tokio::time::sleep(self.script.condition_delay).await;
        }
        if let Some(reason) = &self.script.error {
            return Ok(SurfaceCondition::Error(reason.clone()));
        }
        let mut view = self.view();
        if view.checks < self.script.loading_checks {
            view.checks += 1;
            return Ok(SurfaceCondition::Loading);
        }
        Ok(SurfaceCondition::Ready)
    }

    async fn locate_content_area(&self) -> Result<bool, SurfaceFault> {
        Ok(self.script.has_content_area)
    }

    async fn assign_text(&self, text: &str) -> Result<(), SurfaceFault> {
        if self.script.accepts.bulk || text.is_empty() {
            self.view().content = text.to_string();
        }
        Ok(())
    }

    async fn assign_markup(&self, markup: &str) -> Result<(), SurfaceFault> {
        if self.script.accepts.markup {
            self.view().content = markup_text(markup);
        }
        Ok(())
    }

    async fn replace_text_natively(&self, text: &str) -> Result<bool, SurfaceFault> {
        match self.script.accepts.native {
            None => Ok(false),
            Some(effective) => {
                if effective {
                    self.view().content = text.to_string();
                }
                Ok(true)
            }
        }
    }

    async fn append_char(&self, ch: char) -> Result<(), SurfaceFault> {
        if self.script.accepts.typing {
            self.view().content.push(ch);
        }
        Ok(())
    }

    async fn dispatch(&self, signals: &[InputSignal]) -> Result<(), SurfaceFault> {
        if self.script.confirm_key_sends && signals.contains(&InputSignal::Confirm(KeyPhase::Down))
        {
            self.submit();
        }
        Ok(())
    }

    async fn content_text(&self) -> Result<Option<String>, SurfaceFault> {
        if !self.script.has_content_area {
            return Ok(None);
        }
        Ok(Some(self.view().content.clone()))
    }

    async fn activate_send_control(&self) -> Result<bool, SurfaceFault> {
        // The send control only shows up once there is something to send.
        if !self.script.has_send_control || self.view().content.trim().is_empty() {
            return Ok(false);
        }
        self.submit();
        Ok(true)
    }

    async fn observe(&self) -> Result<SurfaceObservation, SurfaceFault> {
        if self.script.fault_on_observe {
            return Err(SurfaceFault::new("page crashed"));
        }
        if self.script.panic_on_observe {
            panic!("observer lost its document");
        }
        let mut view = self.view();
        match view.pending_lag {
            Some(0) => {
                view.pending_lag = None;
                view.show_delivered();
            }
            Some(left) => view.pending_lag = Some(left - 1),
            None => {}
        }
        Ok(SurfaceObservation {
            outbound_markers: view.outbound_markers,
            status_markers: view.status_markers,
            recent: view.recent.clone(),
        })
    }

    async fn release(self: Box<Self>) -> Result<(), SurfaceFault> {
        self.ledger.update(self.index, |r| {
            r.releases += 1;
            r.released_at = Some(Instant::now());
        });
        Ok(())
    }
}

/// Text content of a single escaped text-run element.
fn markup_text(markup: &str) -> String {
    let inner = match (markup.find('>'), markup.rfind('<')) {
        (Some(open), Some(close)) if open < close => &markup[open + 1..close],
        _ => markup,
    };
    inner
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Payload, request_address};
    use ulid::Ulid;

    fn request(target: &str) -> ContextRequest {
        let target = Target::parse(target).unwrap();
        let payload = Payload::new("hi");
        ContextRequest {
            attempt_id: AttemptId::from(Ulid::nil()),
            address: request_address("https://surface.test", &target, &payload),
            target,
            payload,
        }
    }

    #[tokio::test]
    async fn delivering_surface_records_submission_and_release() {
        let provider = ScriptedProvider::new(SurfaceScript::delivering());
        let ctx = provider.open(request("+15551234567")).await.unwrap();

        ctx.assign_text("hi").await.unwrap();
        assert!(ctx.activate_send_control().await.unwrap());
        assert_eq!(ctx.content_text().await.unwrap().as_deref(), Some(""));
        assert_eq!(ctx.observe().await.unwrap().outbound_markers, 1);
        ctx.release().await.unwrap();

        let records = provider.ledger().records();
        assert_eq!(records.len(), 1);
        assert!(records[0].submitted_at.is_some());
        assert!(provider.ledger().all_released_once());
    }

    #[tokio::test]
    async fn per_target_scripts_are_consumed_in_order() {
        let provider = ScriptedProvider::default()
            .script_for("+15551234567", SurfaceScript::rejecting("invalid"))
            .script_for("+15551234567", SurfaceScript::delivering());

        let first = provider.open(request("+15551234567")).await.unwrap();
        assert!(matches!(
            first.condition().await.unwrap(),
            SurfaceCondition::Error(_)
        ));
        for _ in 0..2 {
            let next = provider.open(request("+15551234567")).await.unwrap();
            assert_eq!(next.condition().await.unwrap(), SurfaceCondition::Ready);
        }
    }

    #[tokio::test]
    async fn loading_checks_precede_ready() {
        let provider = ScriptedProvider::new(SurfaceScript {
            loading_checks: 2,
            ..SurfaceScript::default()
        });
        let ctx = provider.open(request("+15551234567")).await.unwrap();
        assert_eq!(ctx.condition().await.unwrap(), SurfaceCondition::Loading);
        assert_eq!(ctx.condition().await.unwrap(), SurfaceCondition::Loading);
        assert_eq!(ctx.condition().await.unwrap(), SurfaceCondition::Ready);
    }

    #[tokio::test]
    async fn send_control_is_absent_while_content_is_empty() {
        let provider = ScriptedProvider::default();
        let ctx = provider.open(request("+15551234567")).await.unwrap();
        assert!(!ctx.activate_send_control().await.unwrap());
        assert!(provider.ledger().records()[0].submitted_at.is_none());
    }

    #[tokio::test]
    async fn lagging_markers_show_up_after_the_configured_observations() {
        let provider = ScriptedProvider::new(SurfaceScript {
            marker_lag: 2,
            ..SurfaceScript::default()
        });
        let ctx = provider.open(request("+15551234567")).await.unwrap();
        ctx.assign_text("hi").await.unwrap();
        assert!(ctx.activate_send_control().await.unwrap());
        assert_eq!(ctx.content_text().await.unwrap().as_deref(), Some(""));

        assert_eq!(ctx.observe().await.unwrap().outbound_markers, 0);
        assert_eq!(ctx.observe().await.unwrap().outbound_markers, 0);
        let shown = ctx.observe().await.unwrap();
        assert_eq!(shown.outbound_markers, 1);
        assert_eq!(shown.recent, vec![EntryDirection::Outbound]);
        assert_eq!(ctx.observe().await.unwrap().outbound_markers, 1);
    }

    #[test]
    fn markup_text_unescapes_single_run() {
        assert_eq!(
            markup_text(r#"<span data-lexical-text="true">a &lt;b&gt; &amp; c</span>"#),
            "a <b> & c"
        );
    }
}
