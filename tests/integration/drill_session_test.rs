//! End-to-end drill runs through the real communicator.
//!
//! A mock radio stands in for the adapter; every write the sequencer makes
//! goes through the connection state machine before it is recorded.

use crate::mock_radio::{dragon, powered_communicator, ready_communicator, MockRadio, Request};
use dragonbot::ble::{Communicator, ConnectionState, RadioEvent, RadioEvents};
use dragonbot::drills::{DrillError, DrillSequencer, DrillTick, LoopMode};
use dragonbot::protocol::{
    SwapChannel, SwapConfig, DRAGONBOT_CHARACTERISTIC_UUID, DRAGONBOT_SERVICE_UUID,
};
use dragonbot::storage::{ShotConfig, ShotStore};

fn create_store(dir: &tempfile::TempDir, count: usize) -> ShotStore {
    let mut store = ShotStore::open(dir.path().join("shots.json"));
    for i in 0..count {
        let mut shot = ShotConfig::new(0);
        shot.speed_ab = 60.0 + i as f64 * 60.0;
        shot.target_d = 255.0 * i as f64 / 2.0;
        store.add(shot).unwrap();
    }
    store
}

fn run(sequencer: &mut DrillSequencer, communicator: &mut Communicator<MockRadio>) {
    for _ in 0..1000 {
        if sequencer.tick(communicator) == DrillTick::Finished {
            return;
        }
    }
    panic!("drill did not finish");
}

#[test]
fn test_drill_over_saved_shots() {
    let dir = tempfile::tempdir().unwrap();
    let store = create_store(&dir, 3);
    let mut communicator = ready_communicator();
    let mut sequencer = DrillSequencer::new();
    sequencer.set_interval(2);
    sequencer.set_loop_mode(LoopMode::finite(2));

    sequencer.start(&store.sorted(), &mut communicator).unwrap();
    run(&mut sequencer, &mut communicator);

    let shots: Vec<String> = store
        .sorted()
        .iter()
        .map(|s| s.to_drill_command(false).to_string())
        .collect();
    let mut expected = vec!["[N02]".to_string(), "[GO]".to_string()];
    expected.extend(shots.iter().cloned());
    expected.extend(shots.iter().cloned());
    expected.push("[STOP]".to_string());

    assert_eq!(communicator.radio().writes(), expected);

    // Everything went to the command characteristic of the connected device
    for request in &communicator.radio().requests {
        match request {
            Request::Write(device, characteristic, _) => {
                assert_eq!(*device, dragon());
                assert_eq!(*characteristic, DRAGONBOT_CHARACTERISTIC_UUID);
            }
            other => panic!("unexpected request {:?}", other),
        }
    }
}

#[test]
fn test_drill_cannot_start_before_ready() {
    let dir = tempfile::tempdir().unwrap();
    let store = create_store(&dir, 2);
    let mut communicator = powered_communicator();
    communicator.request_scan();
    communicator.on_device_discovered(dragon(), Some("DragonBot".to_string()), -60);
    communicator.connect(&dragon()).unwrap();
    communicator.on_connected(&dragon());
    assert_eq!(communicator.state(), ConnectionState::Discovering);

    let mut sequencer = DrillSequencer::new();
    let result = sequencer.start(&store.sorted(), &mut communicator);

    assert_eq!(result, Err(DrillError::NotReady));
    assert!(communicator.radio().writes().is_empty());
}

#[test]
fn test_disconnect_mid_drill_drops_writes() {
    let dir = tempfile::tempdir().unwrap();
    let store = create_store(&dir, 3);
    let mut communicator = ready_communicator();
    let mut sequencer = DrillSequencer::new();
    sequencer.set_interval(1);

    sequencer.start(&store.sorted(), &mut communicator).unwrap();
    assert_eq!(sequencer.tick(&mut communicator), DrillTick::Fired(1));

    RadioEvent::Disconnected(dragon()).dispatch(&mut communicator);
    assert_eq!(communicator.state(), ConnectionState::Disconnected);

    // The sequencer keeps its timeline; the link drops what it is given
    run(&mut sequencer, &mut communicator);
    assert!(!sequencer.is_running());

    let writes = communicator.radio().writes();
    assert_eq!(writes.len(), 3);
    assert_eq!(writes[..2], ["[N01]", "[GO]"]);
    assert!(writes[2].starts_with("[SH"));
}

#[test]
fn test_shots_edited_during_drill_keep_old_values() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = create_store(&dir, 2);
    let mut communicator = ready_communicator();
    let mut sequencer = DrillSequencer::new();
    sequencer.set_interval(1);

    let before: Vec<String> = store
        .sorted()
        .iter()
        .map(|s| s.to_drill_command(false).to_string())
        .collect();
    sequencer.start(&store.sorted(), &mut communicator).unwrap();

    let mut edited = store.get(2).unwrap().clone();
    edited.speed_ab = 0.0;
    store.update(edited).unwrap();
    store.add(ShotConfig::new(0)).unwrap();

    run(&mut sequencer, &mut communicator);

    let shots: Vec<String> = communicator
        .radio()
        .writes()
        .into_iter()
        .filter(|w| w.starts_with("[SH"))
        .collect();
    assert_eq!(shots, before);
}

#[test]
fn test_reconnect_after_drop() {
    let mut communicator = ready_communicator();
    communicator.on_disconnected(&dragon());
    assert_eq!(communicator.state(), ConnectionState::Disconnected);

    communicator.request_scan();
    communicator.on_device_discovered(dragon(), Some("DragonBot".to_string()), -48);
    communicator.connect(&dragon()).unwrap();
    communicator.on_connected(&dragon());
    communicator.on_services_discovered(&dragon(), &[DRAGONBOT_SERVICE_UUID]);
    communicator.on_characteristics_discovered(
        &dragon(),
        DRAGONBOT_SERVICE_UUID,
        &[DRAGONBOT_CHARACTERISTIC_UUID],
    );
    assert!(communicator.is_ready());

    let dir = tempfile::tempdir().unwrap();
    let store = create_store(&dir, 1);
    let mut sequencer = DrillSequencer::new();
    sequencer.start(&store.sorted(), &mut communicator).unwrap();
    run(&mut sequencer, &mut communicator);

    assert_eq!(communicator.radio().writes().len(), 4);
}

#[test]
fn test_swap_sequence_through_communicator() {
    let mut communicator = ready_communicator();
    let swap = SwapConfig {
        first: SwapChannel {
            speed: 200.0,
            delay: 99.0,
        },
        second: SwapChannel {
            speed: 10.0,
            delay: 0.0,
        },
    };

    for command in swap.commands() {
        communicator.send_command(&command.to_string());
    }

    let writes = communicator.radio().writes();
    assert_eq!(writes.len(), 4);
    assert_eq!(writes[0], "[WA]");
    assert!(writes[1].starts_with("[Y200992727"));
    assert!(writes[2].starts_with("[Y010"));
    assert_eq!(writes[3], "[PL]");
}
