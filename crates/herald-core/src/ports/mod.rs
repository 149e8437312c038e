//! Ports - 抽象化レイヤー
//!
//! 外部システム（target surface, 制御面, 時計）へのインターフェースを定義し、
//! 実装の詳細を隠蔽します。

pub mod clock;
pub mod event_sink;
pub mod id_generator;
pub mod surface;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::StatusSink;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::surface::{
    CHANGE_SIGNALS, CONFIRM_SIGNALS, ContextProvider, ContextRequest, EntryDirection, InputSignal,
    KeyPhase, SurfaceCondition, SurfaceContext, SurfaceObservation,
};
