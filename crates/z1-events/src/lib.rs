//! Game events inferred from consecutive stable states of one racer.

pub mod event;
pub mod inferencer;
pub mod memo;

pub use event::{EventType, GameEvent, Priority, TickInfo};
pub use inferencer::{EventInferencer, InferenceConfig, InferenceConfigError};
pub use memo::SessionMemo;
