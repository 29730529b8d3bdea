//! Types shared by the BLE connection layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of identity characters shown when a device advertises no name.
const SHORT_ID_LEN: usize = 8;

/// Opaque platform identity of a peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading characters of the identity, for display.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(SHORT_ID_LEN) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A peripheral seen during scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Platform identity
    pub id: DeviceId,
    /// Advertised local name
    pub name: Option<String>,
    /// Signal strength in dBm
    pub rssi: i16,
    /// Currently connected
    pub is_connected: bool,
    /// Bonded with the host
    pub is_paired: bool,
}

impl Device {
    pub fn new(id: DeviceId, name: Option<String>, rssi: i16) -> Self {
        Self {
            id,
            name,
            rssi,
            is_connected: false,
            is_paired: false,
        }
    }

    /// Advertised name, or a truncated identity when the device has none.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("Device {}", self.id.short()),
        }
    }
}

/// Power state reported by the host adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdapterState {
    /// Not reported yet
    #[default]
    Unknown,
    PoweredOn,
    PoweredOff,
    Unauthorized,
    Unsupported,
    Resetting,
}

impl AdapterState {
    pub fn is_powered_on(self) -> bool {
        self == AdapterState::PoweredOn
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterState::Unknown => write!(f, "Unknown"),
            AdapterState::PoweredOn => write!(f, "Bluetooth On"),
            AdapterState::PoweredOff => write!(f, "Bluetooth Off"),
            AdapterState::Unauthorized => write!(f, "Bluetooth Unauthorized"),
            AdapterState::Unsupported => write!(f, "Bluetooth Unsupported"),
            AdapterState::Resetting => write!(f, "Bluetooth Resetting"),
        }
    }
}

/// Connection lifecycle of the communicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Nothing in progress
    #[default]
    Idle,
    /// Scan requested before the adapter powered on
    ScanPending,
    /// Discovering peripherals
    Scanning,
    /// Connection in progress
    Connecting,
    /// Connected, looking for the command characteristic
    Discovering,
    /// Characteristic ready, commands may flow
    Ready,
    /// Connection ended or failed
    Disconnected,
}

impl ConnectionState {
    /// A peripheral connection is open or being opened.
    pub fn has_connection(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Discovering | ConnectionState::Ready
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "Idle"),
            ConnectionState::ScanPending => write!(f, "Waiting for Bluetooth..."),
            ConnectionState::Scanning => write!(f, "Scanning..."),
            ConnectionState::Connecting => write!(f, "Connecting..."),
            ConnectionState::Discovering => write!(f, "Discovering services..."),
            ConnectionState::Ready => write!(f, "Connected"),
            ConnectionState::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// Immutable view of the communicator published after every change.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub adapter: AdapterState,
    /// Discovered devices in first-seen order
    pub devices: Vec<Device>,
    /// Device being connected to or connected
    pub target: Option<DeviceId>,
}

impl ConnectionSnapshot {
    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    pub fn is_scanning(&self) -> bool {
        self.state == ConnectionState::Scanning
    }
}

/// Errors that can occur in the BLE layer.
#[derive(Debug, Error)]
pub enum BleError {
    /// BLE adapter not found or unavailable
    #[error("Bluetooth adapter not found")]
    AdapterNotFound,

    /// Adapter is present but not powered on
    #[error("Bluetooth is not available: {0}")]
    AdapterUnavailable(AdapterState),

    /// Another connection is already open or in progress
    #[error("Already connected or connecting to {0}")]
    Busy(DeviceId),

    /// Peripheral not known to the adapter
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceId),

    /// Generic BLE error
    #[error("BLE error: {0}")]
    Btleplug(#[from] btleplug::Error),
}
