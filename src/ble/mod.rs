//! BLE connection layer for the DragonBot.

pub mod btleplug_radio;
pub mod communicator;
pub mod radio;
pub mod registry;
pub mod types;

pub use btleplug_radio::BtleplugRadio;
pub use communicator::{CommandLink, Communicator};
pub use radio::{Radio, RadioEvent, RadioEvents, RadioRequest, RequestQueue};
pub use registry::DeviceRegistry;
pub use types::{AdapterState, BleError, ConnectionSnapshot, ConnectionState, Device, DeviceId};
