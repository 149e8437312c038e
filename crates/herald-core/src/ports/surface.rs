//! Surface ports - 外部アプリケーション（target surface）への窓口
//!
//! 1 attempt につき 1 つの [`SurfaceContext`] を [`ContextProvider`] から開き、
//! attempt の終了時に必ず 1 回だけ [`SurfaceContext::release`] します。
//!
//! # 設計原則
//! - メソッドは `&self` を取る（ブラウザ自動化クライアントと同じく内部で同期する）
//! - アダプタはエラーを分類しない。分類は Delivery Worker の責務
//! - 「送信できたか」を直接返す API は存在しない。観測結果だけを返す

use async_trait::async_trait;

use crate::domain::{AttemptId, Payload, SurfaceFault, Target};

/// What the surface currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCondition {
    /// Still loading (splash, spinner, no composer yet).
    Loading,

    /// Composer visible, no loading indicator.
    Ready,

    /// Invalid target, blocked, unsupported browser, ...
    Error(String),
}

/// Phase of a synthesized key stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyPhase {
    Down,
    Press,
    Up,
}

/// A signal dispatched to the content area so the surface's own logic reacts to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputSignal {
    Focus,
    Input,
    Change,
    KeyUp,

    /// The surface's canonical "confirm" key (Enter).
    Confirm(KeyPhase),
}

/// Signals that make the surface treat the content as user-entered.
pub const CHANGE_SIGNALS: [InputSignal; 4] = [
    InputSignal::Focus,
    InputSignal::Input,
    InputSignal::Change,
    InputSignal::KeyUp,
];

/// A full confirm key stroke.
pub const CONFIRM_SIGNALS: [InputSignal; 3] = [
    InputSignal::Confirm(KeyPhase::Down),
    InputSignal::Confirm(KeyPhase::Press),
    InputSignal::Confirm(KeyPhase::Up),
];

/// Direction of a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryDirection {
    Inbound,
    Outbound,
}

/// Structural snapshot of the conversation view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurfaceObservation {
    /// Number of outbound message markers in the view.
    pub outbound_markers: usize,

    /// Number of delivery/read status markers in the view.
    pub status_markers: usize,

    /// Directions of the most recent entries, oldest first.
    pub recent: Vec<EntryDirection>,
}

/// Everything a provider needs to open a surface for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextRequest {
    pub attempt_id: AttemptId,
    pub target: Target,
    pub payload: Payload,

    /// Canonical request address `(recipient, url-encoded payload)`.
    pub address: String,
}

/// An ephemeral surface bound to one (target, payload) pair.
#[async_trait]
pub trait SurfaceContext: Send + Sync {
    /// Current condition (used for readiness polling).
    async fn condition(&self) -> Result<SurfaceCondition, SurfaceFault>;

    /// Find and focus the content area. `false` if there is none.
    async fn locate_content_area(&self) -> Result<bool, SurfaceFault>;

    /// Bulk assignment of the area's plain text value.
    async fn assign_text(&self, text: &str) -> Result<(), SurfaceFault>;

    /// Assignment of structured markup mimicking the surface's internal representation.
    async fn assign_markup(&self, markup: &str) -> Result<(), SurfaceFault>;

    /// Select-all + native insert-text command. `Ok(false)` if the surface has none.
    async fn replace_text_natively(&self, text: &str) -> Result<bool, SurfaceFault>;

    /// Append one character, as a keystroke would.
    async fn append_char(&self, ch: char) -> Result<(), SurfaceFault>;

    async fn dispatch(&self, signals: &[InputSignal]) -> Result<(), SurfaceFault>;

    /// Text currently in the content area, `None` if the area is gone.
    async fn content_text(&self) -> Result<Option<String>, SurfaceFault>;

    /// Click the send control. `Ok(false)` if there is no enabled control.
    async fn activate_send_control(&self) -> Result<bool, SurfaceFault>;

    async fn observe(&self) -> Result<SurfaceObservation, SurfaceFault>;

    /// Close and discard the surface.
    async fn release(self: Box<Self>) -> Result<(), SurfaceFault>;
}

/// Opens fresh, isolated surfaces.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn open(&self, request: ContextRequest) -> Result<Box<dyn SurfaceContext>, SurfaceFault>;
}
