//! Unit tests for command encoding.

use dragonbot::protocol::{
    scale20, scale99, scale_delay, scale_rotation, Axis, Command, ShotCommand, ShotParams,
};
use dragonbot::storage::ShotConfig;

#[test]
fn test_scale99_range() {
    for v in 0..=255 {
        let scaled = scale99(v as f64);
        assert!(scaled <= 99, "scale99({}) = {}", v, scaled);
    }
    assert_eq!(scale99(0.0), 0);
    assert_eq!(scale99(255.0), 99);
}

#[test]
fn test_scale99_is_monotonic() {
    let mut previous = 0;
    for v in 0..=255 {
        let scaled = scale99(v as f64);
        assert!(scaled >= previous);
        previous = scaled;
    }
}

#[test]
fn test_scale20_endpoints() {
    assert_eq!(scale20(0.0), 0);
    assert_eq!(scale20(255.0), 20);
    for v in 0..=255 {
        assert!(scale20(v as f64) <= 20);
    }
}

#[test]
fn test_scale_rotation_endpoints() {
    assert_eq!(scale_rotation(0.0), -3000);
    assert_eq!(scale_rotation(255.0), 3000);
    assert!(scale_rotation(128.0).abs() <= 24);
    assert!(scale_rotation(127.0).abs() <= 24);
}

#[test]
fn test_out_of_range_inputs_are_clamped() {
    assert_eq!(scale99(-1.0), 0);
    assert_eq!(scale99(1000.0), 99);
    assert_eq!(scale20(-50.0), 0);
    assert_eq!(scale_rotation(9999.0), 3000);
    assert_eq!(scale_delay(-5.0), 0);
    assert_eq!(scale_delay(2500.0), 99);
}

#[test]
fn test_shot_command_centre() {
    let command = ShotCommand::encode(&ShotParams {
        target_x: 0.0,
        target_y: 0.0,
        speed_1: 0.0,
        speed_2: 0.0,
        delay_ms: 0.0,
        carriage_x: 0.0,
        carriage_y: 0.0,
        rotation: 127.5,
    });
    assert_eq!(command.to_string(), "[SH00,00,00,00,00,00,00,0]");
}

#[test]
fn test_shot_config_uses_independent_wheels() {
    let mut shot = ShotConfig::new(1);
    shot.speed_a = 255.0;
    shot.speed_b = 0.0;
    shot.speed_ab = 127.5;
    shot.delay_e = 2000.0;
    shot.target_d = 255.0;
    shot.target_c = 0.0;
    shot.target_f = 255.0;
    shot.target_g = 0.0;
    shot.target_h = 255.0;

    assert_eq!(shot.to_command().to_string(), "[SH99,00,99,00,99,20,00,3000]");
}

#[test]
fn test_drill_command_duplicates_combined_speed() {
    let mut shot = ShotConfig::new(1);
    shot.speed_a = 255.0;
    shot.speed_b = 0.0;
    shot.speed_ab = 255.0;

    let Command::Shot(combined) = shot.to_drill_command(false) else {
        panic!("expected a shot command");
    };
    assert_eq!(combined.wheel_1, 99);
    assert_eq!(combined.wheel_2, 99);

    let Command::Shot(per_wheel) = shot.to_drill_command(true) else {
        panic!("expected a shot command");
    };
    assert_eq!(per_wheel.wheel_1, 99);
    assert_eq!(per_wheel.wheel_2, 0);
}

#[test]
fn test_axis_commands() {
    let wire: Vec<String> = Axis::ALL
        .iter()
        .map(|axis| Command::axis(*axis, 42.0).to_string())
        .collect();
    assert_eq!(wire, vec!["[A042]", "[B042]", "[C042]", "[D042]", "[E042]"]);
}

#[test]
fn test_bytes_are_ascii_text() {
    assert_eq!(Command::Stop.to_bytes(), b"[STOP]".to_vec());
    assert_eq!(Command::loop_count(2).to_bytes(), b"[N02]".to_vec());
}

#[test]
fn test_every_command_parses_back() {
    let commands = [
        Command::loop_count(42),
        Command::InfiniteLoop,
        Command::Go,
        Command::Stop,
        Command::DeleteShot,
        Command::ZeroAxes,
        Command::DrillMode,
        Command::ManualMode(0),
        Command::AutoMode(0),
        Command::axis(Axis::LeftRight, 255.0),
        Command::Shutdown,
        Command::RemoteMode,
        Command::SwapActivate,
        Command::SwapExecute,
        Command::swap(255.0, 128.0),
        ShotConfig::new(1).to_command(),
    ];

    for command in commands {
        let parsed: Command = command.to_string().parse().unwrap();
        assert_eq!(parsed, command);
    }
}
