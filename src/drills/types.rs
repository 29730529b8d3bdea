//! Drill types.

use crate::protocol::commands::MAX_LOOP_COUNT;
use crate::protocol::Command;
use crate::storage::shots::ShotConfig;
use std::fmt;
use thiserror::Error;

/// How many passes a drill makes over its shot list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    /// Fixed number of passes (1-99)
    Finite(u8),
    /// Repeat until stopped
    Infinite,
}

impl LoopMode {
    /// Finite mode with the count clamped to `1..=99`.
    pub fn finite(count: u32) -> Self {
        LoopMode::Finite(count.clamp(1, MAX_LOOP_COUNT as u32) as u8)
    }

    /// Directive announcing this mode to the device.
    pub fn directive(self) -> Command {
        match self {
            LoopMode::Finite(count) => Command::loop_count(count as u32),
            LoopMode::Infinite => Command::InfiniteLoop,
        }
    }

    /// Whether another pass follows after `completed` passes.
    pub fn repeats_after(self, completed: u32) -> bool {
        match self {
            LoopMode::Finite(count) => completed < count as u32,
            LoopMode::Infinite => true,
        }
    }
}

impl Default for LoopMode {
    fn default() -> Self {
        LoopMode::Finite(1)
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopMode::Finite(1) => write!(f, "1 loop"),
            LoopMode::Finite(count) => write!(f, "{} loops", count),
            LoopMode::Infinite => write!(f, "Infinite"),
        }
    }
}

/// State of a running drill. The shot list is frozen at start.
#[derive(Debug, Clone)]
pub struct DrillSession {
    /// Shots sorted by shot number
    pub shots: Vec<ShotConfig>,
    /// Index of the next shot to fire
    pub cursor: usize,
    /// Completed passes over the shot list
    pub loops_completed: u32,
    /// Ticks left before the next action
    pub countdown: u32,
    pub loop_mode: LoopMode,
    pub interval_secs: u32,
    pub per_wheel_speeds: bool,
}

/// Read-only view of the sequencer for display.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DrillStatus {
    pub running: bool,
    /// Shot number fired next, if the current pass has shots left
    pub next_shot: Option<u32>,
    pub loops_completed: u32,
    pub countdown: u32,
    pub total_shots: usize,
    pub loop_mode: LoopMode,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrillTick {
    /// No drill running
    Idle,
    /// Counting down between shots
    Waiting,
    /// Fired the given shot number
    Fired(u32),
    /// Finished a pass and rewound to the first shot
    Looped,
    /// Finished the last pass and stopped
    Finished,
}

/// Reasons a drill cannot start.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DrillError {
    /// The device is not connected and ready
    #[error("Device is not ready")]
    NotReady,

    /// There are no shots to run
    #[error("No shots configured")]
    NoShots,

    /// A drill is already in progress
    #[error("Drill already running")]
    AlreadyRunning,
}
