//! Drill module for timed shot sequences.

pub mod engine;
pub mod types;

pub use engine::DrillSequencer;
pub use types::{DrillError, DrillSession, DrillStatus, DrillTick, LoopMode};
