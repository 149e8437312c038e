//! Domain model (targets, jobs, attempts, outcomes, errors, events).
//!
//! このモジュールは tokio や surface の実装に依存しません。

pub mod attempt;
pub mod decision;
pub mod errors;
pub mod events;
pub mod ids;
pub mod job;
pub mod outcome;
pub mod payload;
pub mod retry;
pub mod target;

pub use self::attempt::{AttemptRecord, AttemptState, DeliveryReport};
pub use self::decision::{Decider, Decision, RetryDecider};
pub use self::errors::{DeliveryError, ErrorKind, SubmitError, SurfaceFault};
pub use self::events::{SendComplete, SendProgress, StatusEvent};
pub use self::ids::{AttemptId, JobId};
pub use self::job::{JobError, JobLimits, JobSpec, Statistics};
pub use self::outcome::{Outcome, Verdict};
pub use self::payload::{Payload, request_address};
pub use self::retry::RetryPolicy;
pub use self::target::{Target, TargetError, TargetList};
