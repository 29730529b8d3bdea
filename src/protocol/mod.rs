//! Command encoding for the DragonBot wire protocol.

pub mod commands;

pub use commands::{
    clamp_slider, scale20, scale99, scale_delay, scale_rotation, Axis, Command, ProtocolError,
    ShotCommand, ShotParams, SwapChannel, SwapConfig, DRAGONBOT_CHARACTERISTIC_UUID,
    DRAGONBOT_SERVICE_UUID,
};
