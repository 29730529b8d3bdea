//! DragonBot - BLE controller core for a tennis-ball launcher
//!
//! Scans for and connects to a DragonBot over Bluetooth Low Energy, encodes
//! shot parameters into the device's bracketed ASCII command protocol, and
//! sequences saved shots into timed drills.

pub mod ble;
pub mod drills;
pub mod protocol;
pub mod storage;

// Re-export commonly used types
pub use ble::communicator::Communicator;
pub use drills::engine::DrillSequencer;
pub use protocol::commands::Command;
pub use storage::shots::{ShotConfig, ShotStore};
