//! Unit tests for the drill sequencer.

use dragonbot::ble::CommandLink;
use dragonbot::drills::{DrillError, DrillSequencer, DrillTick, LoopMode};
use dragonbot::protocol::Command;
use dragonbot::storage::config::DrillSettings;
use dragonbot::storage::ShotConfig;

/// Link that records what it was asked to send.
#[derive(Default)]
struct FakeLink {
    ready: bool,
    sent: Vec<String>,
}

impl FakeLink {
    fn ready() -> Self {
        Self {
            ready: true,
            sent: Vec::new(),
        }
    }

    fn shots_sent(&self) -> usize {
        self.sent.iter().filter(|s| s.starts_with("[SH")).count()
    }
}

impl CommandLink for FakeLink {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn send(&mut self, command: &Command) {
        if self.ready {
            self.sent.push(command.to_string());
        }
    }
}

/// Shots whose combined speed identifies them on the wire.
fn create_test_shots(count: u32) -> Vec<ShotConfig> {
    (1..=count)
        .map(|n| {
            let mut shot = ShotConfig::new(n);
            shot.speed_ab = n as f64 * 51.0;
            shot
        })
        .collect()
}

fn shot_wire(shot: &ShotConfig) -> String {
    shot.to_drill_command(false).to_string()
}

/// Tick until the drill finishes, returning the number of ticks taken.
fn run_to_completion(sequencer: &mut DrillSequencer, link: &mut FakeLink) -> usize {
    for ticks in 1..=1000 {
        if sequencer.tick(link) == DrillTick::Finished {
            return ticks;
        }
    }
    panic!("drill did not finish");
}

#[test]
fn test_start_refused_when_not_ready() {
    let mut sequencer = DrillSequencer::new();
    let mut link = FakeLink::default();

    let result = sequencer.start(&create_test_shots(3), &mut link);

    assert_eq!(result, Err(DrillError::NotReady));
    assert!(!sequencer.is_running());
    assert!(link.sent.is_empty());
}

#[test]
fn test_start_refused_with_no_shots() {
    let mut sequencer = DrillSequencer::new();
    let mut link = FakeLink::ready();

    let result = sequencer.start(&[], &mut link);

    assert_eq!(result, Err(DrillError::NoShots));
    assert!(!link.sent.contains(&"[GO]".to_string()));
    assert!(link.sent.is_empty());
}

#[test]
fn test_start_twice_is_refused() {
    let mut sequencer = DrillSequencer::new();
    let mut link = FakeLink::ready();
    sequencer.start(&create_test_shots(1), &mut link).unwrap();

    let result = sequencer.start(&create_test_shots(1), &mut link);

    assert_eq!(result, Err(DrillError::AlreadyRunning));
    assert_eq!(link.sent, vec!["[N01]", "[GO]"]);
}

#[test]
fn test_three_shots_two_loops() {
    let shots = create_test_shots(3);
    let mut sequencer = DrillSequencer::new();
    sequencer.set_interval(2);
    sequencer.set_loop_mode(LoopMode::finite(2));
    let mut link = FakeLink::ready();

    sequencer.start(&shots, &mut link).unwrap();
    let mut looped = 0;
    loop {
        match sequencer.tick(&mut link) {
            DrillTick::Looped => looped += 1,
            DrillTick::Finished => break,
            _ => {}
        }
    }

    let expected: Vec<String> = ["[N02]".to_string(), "[GO]".to_string()]
        .into_iter()
        .chain(shots.iter().map(shot_wire))
        .chain(shots.iter().map(shot_wire))
        .chain(std::iter::once("[STOP]".to_string()))
        .collect();
    assert_eq!(link.sent, expected);
    assert_eq!(link.shots_sent(), 6);
    // One rewind between the passes, then completion
    assert_eq!(looped, 1);
    assert!(!sequencer.is_running());
}

#[test]
fn test_tick_timing() {
    let shots = create_test_shots(2);
    let mut sequencer = DrillSequencer::new();
    sequencer.set_interval(2);
    let mut link = FakeLink::ready();
    sequencer.start(&shots, &mut link).unwrap();

    assert_eq!(sequencer.tick(&mut link), DrillTick::Fired(1));
    assert_eq!(sequencer.tick(&mut link), DrillTick::Waiting);
    assert_eq!(sequencer.tick(&mut link), DrillTick::Waiting);
    assert_eq!(sequencer.tick(&mut link), DrillTick::Fired(2));
    assert_eq!(sequencer.tick(&mut link), DrillTick::Waiting);
    assert_eq!(sequencer.tick(&mut link), DrillTick::Waiting);
    assert_eq!(sequencer.tick(&mut link), DrillTick::Finished);
    assert_eq!(sequencer.tick(&mut link), DrillTick::Idle);
}

#[test]
fn test_shots_fire_in_shot_number_order() {
    let mut shots = create_test_shots(3);
    shots.reverse();
    let mut sequencer = DrillSequencer::new();
    let mut link = FakeLink::ready();
    sequencer.start(&shots, &mut link).unwrap();

    let mut fired = Vec::new();
    loop {
        match sequencer.tick(&mut link) {
            DrillTick::Fired(n) => fired.push(n),
            DrillTick::Finished => break,
            _ => {}
        }
    }
    assert_eq!(fired, vec![1, 2, 3]);
}

#[test]
fn test_snapshot_is_frozen_at_start() {
    let mut shots = create_test_shots(2);
    let mut sequencer = DrillSequencer::new();
    sequencer.set_interval(1);
    let mut link = FakeLink::ready();
    sequencer.start(&shots, &mut link).unwrap();

    // Edits and setting changes after start do not reach the running drill
    shots[1].speed_ab = 0.0;
    shots.push(ShotConfig::new(3));
    sequencer.set_interval(10);
    sequencer.set_loop_mode(LoopMode::finite(5));

    let ticks = run_to_completion(&mut sequencer, &mut link);
    assert_eq!(link.shots_sent(), 2);
    assert_eq!(ticks, 5);
    assert!(link.sent.contains(&shot_wire(&create_test_shots(2)[1])));
}

#[test]
fn test_infinite_loop_runs_until_stopped() {
    let mut sequencer = DrillSequencer::new();
    sequencer.set_interval(1);
    sequencer.set_loop_mode(LoopMode::Infinite);
    let mut link = FakeLink::ready();
    sequencer.start(&create_test_shots(1), &mut link).unwrap();
    assert_eq!(link.sent[0], "[I]");

    for _ in 0..300 {
        assert_ne!(sequencer.tick(&mut link), DrillTick::Finished);
    }
    assert!(sequencer.status().loops_completed > 50);

    sequencer.stop(&mut link);
    assert!(!sequencer.is_running());
    assert_eq!(link.sent.last().unwrap(), "[STOP]");
}

#[test]
fn test_stop_is_idempotent() {
    let mut sequencer = DrillSequencer::new();
    let mut link = FakeLink::ready();

    sequencer.stop(&mut link);
    sequencer.stop(&mut link);

    assert_eq!(link.sent, vec!["[STOP]", "[STOP]"]);
    let status = sequencer.status();
    assert!(!status.running);
    assert_eq!(status.countdown, 0);
    assert_eq!(status.next_shot, None);
}

#[test]
fn test_status_while_running() {
    let mut sequencer = DrillSequencer::new();
    sequencer.set_interval(3);
    let mut link = FakeLink::ready();
    sequencer.start(&create_test_shots(2), &mut link).unwrap();

    assert_eq!(sequencer.status().next_shot, Some(1));
    sequencer.tick(&mut link);

    let status = sequencer.status();
    assert!(status.running);
    assert_eq!(status.next_shot, Some(2));
    assert_eq!(status.countdown, 3);
    assert_eq!(status.total_shots, 2);
}

#[test]
fn test_interval_and_loop_count_are_clamped() {
    let mut sequencer = DrillSequencer::new();

    sequencer.set_interval(0);
    assert_eq!(sequencer.interval(), 1);
    sequencer.set_interval(60);
    assert_eq!(sequencer.interval(), 10);

    sequencer.set_loop_mode(LoopMode::Finite(0));
    assert_eq!(sequencer.loop_mode(), LoopMode::Finite(1));
    assert_eq!(LoopMode::finite(150), LoopMode::Finite(99));
}

#[test]
fn test_from_settings() {
    let settings = DrillSettings {
        interval_secs: 4,
        loop_count: 3,
        infinite: false,
        per_wheel_speeds: true,
    };
    let mut sequencer = DrillSequencer::from_settings(&settings);
    assert_eq!(sequencer.interval(), 4);
    assert_eq!(sequencer.loop_mode(), LoopMode::Finite(3));

    let mut shot = ShotConfig::new(1);
    shot.speed_a = 255.0;
    shot.speed_b = 0.0;
    let mut link = FakeLink::ready();
    sequencer.start(&[shot.clone()], &mut link).unwrap();
    sequencer.tick(&mut link);

    assert_eq!(link.sent[2], shot.to_drill_command(true).to_string());
}
