//! Game state types and the per-field debounce that turns noisy per-tick
//! readings into stable state.

pub mod stabilizer;
pub mod streak;
pub mod types;

pub use stabilizer::{StabilizerError, StabilizerThresholds, StateStabilizer};
pub use streak::StreakTracker;
pub use types::{BItem, FloorItem, RawGameState, ScreenType, StableGameState};
