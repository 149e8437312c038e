//! Errors - エラー型と分類
//!
//! 失敗を「どこで」「リトライできるか」で分類します。
//! - attempt 内の失敗は [`DeliveryError`]。Delivery Worker がその場で Outcome に畳み込む
//! - submit 時の失敗は [`SubmitError`]。呼び出し元に同期的に返す唯一のエラー

use super::job::JobError;
use super::outcome::Outcome;

/// ErrorKind は運用上の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 一時的（新しい attempt でリトライする価値あり）
    Transient,
    /// 恒久的（リトライ無意味）
    Permanent,
}

/// Why a single delivery attempt did not end in `Sent`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("surface did not become interactive: {0}")]
    ContextUnavailable(String),

    #[error("all content injection strategies exhausted")]
    InjectionFailed,

    #[error("submission could not be confirmed: {0}")]
    Unverified(String),

    #[error("attempt deadline of {0:?} exceeded")]
    TimedOut(std::time::Duration),

    #[error("surface rejected the target: {0}")]
    SurfaceError(String),
}

impl DeliveryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeliveryError::SurfaceError(_) => ErrorKind::Permanent,
            DeliveryError::ContextUnavailable(_)
            | DeliveryError::InjectionFailed
            | DeliveryError::Unverified(_)
            | DeliveryError::TimedOut(_) => ErrorKind::Transient,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Terminal outcome this error maps to.
    pub fn outcome(&self) -> Outcome {
        match self {
            DeliveryError::TimedOut(_) => Outcome::TimedOut,
            _ => Outcome::Failed,
        }
    }
}

/// Errors from a surface adapter (connection lost, element detached, ...).
///
/// These are never classified by the adapter; the worker treats them as `Unverified`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("surface fault: {0}")]
pub struct SurfaceFault(pub String);

impl SurfaceFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<SurfaceFault> for DeliveryError {
    fn from(fault: SurfaceFault) -> Self {
        DeliveryError::Unverified(fault.0)
    }
}

/// Synchronous rejection of a submission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("Already processing")]
    AlreadyRunning,

    #[error(transparent)]
    InvalidJob(#[from] JobError),
}
