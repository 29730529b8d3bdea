//! Drill sequencer.
//!
//! Walks a frozen list of shots, firing one single-shot command per
//! interval and repeating the list for the configured number of passes.
//! Time is supplied by the caller through [`DrillSequencer::tick`], once per
//! second.

use crate::ble::CommandLink;
use crate::drills::types::{DrillError, DrillSession, DrillStatus, DrillTick, LoopMode};
use crate::protocol::Command;
use crate::storage::config::DrillSettings;
use crate::storage::shots::ShotConfig;

/// Shortest gap between shots in seconds.
pub const MIN_INTERVAL_SECS: u32 = 1;

/// Longest gap between shots in seconds.
pub const MAX_INTERVAL_SECS: u32 = 10;

/// Drill execution engine.
#[derive(Debug)]
pub struct DrillSequencer {
    /// Running drill, if any
    session: Option<DrillSession>,
    /// Interval for the next drill
    interval_secs: u32,
    /// Loop mode for the next drill
    loop_mode: LoopMode,
    /// Use per-wheel speeds instead of the combined speed
    per_wheel_speeds: bool,
}

impl Default for DrillSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl DrillSequencer {
    pub fn new() -> Self {
        Self {
            session: None,
            interval_secs: 2,
            loop_mode: LoopMode::default(),
            per_wheel_speeds: false,
        }
    }

    pub fn from_settings(settings: &DrillSettings) -> Self {
        let mut sequencer = Self::new();
        sequencer.set_interval(settings.interval_secs);
        sequencer.set_loop_mode(if settings.infinite {
            LoopMode::Infinite
        } else {
            LoopMode::finite(settings.loop_count)
        });
        sequencer.set_per_wheel_speeds(settings.per_wheel_speeds);
        sequencer
    }

    /// Interval used by the next drill, clamped to 1-10 seconds.
    ///
    /// A running drill keeps the interval it started with.
    pub fn set_interval(&mut self, secs: u32) {
        self.interval_secs = secs.clamp(MIN_INTERVAL_SECS, MAX_INTERVAL_SECS);
    }

    pub fn interval(&self) -> u32 {
        self.interval_secs
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = match mode {
            LoopMode::Finite(count) => LoopMode::finite(count as u32),
            LoopMode::Infinite => LoopMode::Infinite,
        };
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn set_per_wheel_speeds(&mut self, enabled: bool) {
        self.per_wheel_speeds = enabled;
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&DrillSession> {
        self.session.as_ref()
    }

    /// Start a drill over `shots`.
    ///
    /// Nothing is transmitted unless the link is ready and there is at
    /// least one shot.
    pub fn start<L: CommandLink>(
        &mut self,
        shots: &[ShotConfig],
        link: &mut L,
    ) -> Result<(), DrillError> {
        if self.session.is_some() {
            return Err(DrillError::AlreadyRunning);
        }
        if !link.is_ready() {
            return Err(DrillError::NotReady);
        }
        if shots.is_empty() {
            return Err(DrillError::NoShots);
        }

        let mut snapshot = shots.to_vec();
        snapshot.sort_by_key(|shot| shot.shot_number);

        link.send(&self.loop_mode.directive());
        link.send(&Command::Go);

        tracing::info!(
            "Drill started: {} shots, {}s interval, {}",
            snapshot.len(),
            self.interval_secs,
            self.loop_mode
        );

        self.session = Some(DrillSession {
            shots: snapshot,
            cursor: 0,
            loops_completed: 0,
            countdown: 0,
            loop_mode: self.loop_mode,
            interval_secs: self.interval_secs,
            per_wheel_speeds: self.per_wheel_speeds,
        });

        Ok(())
    }

    /// Advance the drill by one second.
    pub fn tick<L: CommandLink>(&mut self, link: &mut L) -> DrillTick {
        let Some(session) = self.session.as_mut() else {
            return DrillTick::Idle;
        };

        if session.countdown > 0 {
            session.countdown -= 1;
            return DrillTick::Waiting;
        }

        if let Some(shot) = session.shots.get(session.cursor) {
            let shot_number = shot.shot_number;
            link.send(&shot.to_drill_command(session.per_wheel_speeds));
            session.cursor += 1;
            session.countdown = session.interval_secs;
            tracing::debug!("Fired shot {}", shot_number);
            return DrillTick::Fired(shot_number);
        }

        session.loops_completed += 1;
        if session.loop_mode.repeats_after(session.loops_completed) {
            session.cursor = 0;
            tracing::debug!("Drill pass {} complete", session.loops_completed);
            return DrillTick::Looped;
        }

        tracing::info!("Drill complete after {} passes", session.loops_completed);
        self.stop(link);
        DrillTick::Finished
    }

    /// Stop the drill and tell the device to stop.
    ///
    /// `[STOP]` is sent even when no drill is running.
    pub fn stop<L: CommandLink>(&mut self, link: &mut L) {
        if self.session.take().is_some() {
            tracing::info!("Drill stopped");
        }
        link.send(&Command::Stop);
    }

    pub fn status(&self) -> DrillStatus {
        match &self.session {
            Some(session) => DrillStatus {
                running: true,
                next_shot: session.shots.get(session.cursor).map(|s| s.shot_number),
                loops_completed: session.loops_completed,
                countdown: session.countdown,
                total_shots: session.shots.len(),
                loop_mode: session.loop_mode,
            },
            None => DrillStatus {
                loop_mode: self.loop_mode,
                ..Default::default()
            },
        }
    }
}
