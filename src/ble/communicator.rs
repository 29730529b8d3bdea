//! Connection state machine for a single DragonBot.
//!
//! The communicator owns the adapter/connection state, the device registry
//! and the reference to the command characteristic. It reacts to radio
//! callbacks through [`RadioEvents`] and issues requests through a [`Radio`].
//! All mutation happens on the thread that owns it; observers receive a
//! [`ConnectionSnapshot`] after every change.

use crate::ble::radio::{Radio, RadioEvents};
use crate::ble::registry::DeviceRegistry;
use crate::ble::types::{
    AdapterState, BleError, ConnectionSnapshot, ConnectionState, Device, DeviceId,
};
use crate::protocol::{Command, DRAGONBOT_CHARACTERISTIC_UUID, DRAGONBOT_SERVICE_UUID};
use crossbeam::channel::{Receiver, Sender};
use uuid::Uuid;

/// Something that can transmit commands to the device.
pub trait CommandLink {
    /// Whether commands will currently reach the device.
    fn is_ready(&self) -> bool;

    /// Transmit a command. Silently dropped when not ready.
    fn send(&mut self, command: &Command);
}

/// BLE policy layer on top of a [`Radio`].
pub struct Communicator<R: Radio> {
    radio: R,
    adapter: AdapterState,
    state: ConnectionState,
    /// Scan requested while the adapter was not powered on
    scan_pending: bool,
    registry: DeviceRegistry,
    /// Device being connected to or connected
    target: Option<DeviceId>,
    /// Command characteristic, set once discovery completes
    characteristic: Option<Uuid>,
    subscribers: Vec<Sender<ConnectionSnapshot>>,
}

impl<R: Radio> Communicator<R> {
    pub fn new(radio: R) -> Self {
        Self {
            radio,
            adapter: AdapterState::Unknown,
            state: ConnectionState::Idle,
            scan_pending: false,
            registry: DeviceRegistry::new(),
            target: None,
            characteristic: None,
            subscribers: Vec::new(),
        }
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn adapter_state(&self) -> AdapterState {
        self.adapter
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn devices(&self) -> &[Device] {
        self.registry.devices()
    }

    pub fn target(&self) -> Option<&DeviceId> {
        self.target.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready && self.characteristic.is_some()
    }

    /// Current state as an immutable snapshot.
    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            state: self.state,
            adapter: self.adapter,
            devices: self.registry.devices().to_vec(),
            target: self.target.clone(),
        }
    }

    /// Receive a snapshot after every state change.
    pub fn subscribe(&mut self) -> Receiver<ConnectionSnapshot> {
        let (tx, rx) = crossbeam::channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    fn publish(&mut self) {
        let snapshot = self.snapshot();
        self.subscribers
            .retain(|tx| tx.send(snapshot.clone()).is_ok());
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::info!("Connection state: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
        self.publish();
    }

    fn is_target(&self, device: &DeviceId) -> bool {
        self.target.as_ref() == Some(device)
    }

    /// Start discovering peripherals.
    ///
    /// When the adapter is not powered on yet the request is remembered and
    /// replayed once it reports powered on.
    pub fn request_scan(&mut self) {
        if self.state.has_connection() {
            tracing::debug!("Ignoring scan request while {:?}", self.state);
            return;
        }

        if !self.adapter.is_powered_on() {
            tracing::info!("Adapter not ready ({}), deferring scan", self.adapter);
            self.scan_pending = true;
            self.set_state(ConnectionState::ScanPending);
            return;
        }

        tracing::info!("Starting device scan");
        self.scan_pending = false;
        self.registry.clear();
        self.radio.start_scan();
        self.set_state(ConnectionState::Scanning);
    }

    pub fn stop_scan(&mut self) {
        match self.state {
            ConnectionState::Scanning => {
                tracing::info!("Stopping device scan");
                self.radio.stop_scan();
                self.set_state(ConnectionState::Idle);
            }
            ConnectionState::ScanPending => {
                self.scan_pending = false;
                self.set_state(ConnectionState::Idle);
            }
            _ => {}
        }
    }

    /// Connect to a device. Scanning is stopped first.
    pub fn connect(&mut self, device: &DeviceId) -> Result<(), BleError> {
        if self.state.has_connection() {
            if let Some(current) = &self.target {
                return Err(BleError::Busy(current.clone()));
            }
        }

        if !self.adapter.is_powered_on() {
            return Err(BleError::AdapterUnavailable(self.adapter));
        }

        if self.state == ConnectionState::Scanning {
            self.radio.stop_scan();
        }
        self.scan_pending = false;

        tracing::info!("Connecting to {}", device);
        self.target = Some(device.clone());
        self.characteristic = None;
        self.radio.connect(device);
        self.set_state(ConnectionState::Connecting);

        Ok(())
    }

    /// Close the active connection. No-op when nothing is connected.
    pub fn disconnect(&mut self) {
        if !self.state.has_connection() {
            tracing::debug!("Disconnect requested with no active connection");
            return;
        }

        if let Some(device) = self.target.take() {
            tracing::info!("Disconnecting from {}", device);
            self.radio.disconnect(&device);
            self.registry.set_connected(&device, false);
        }
        self.characteristic = None;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Write raw command text to the device.
    ///
    /// Only effective when ready; otherwise the text is dropped. The write
    /// is not acknowledged and never retried.
    pub fn send_command(&mut self, text: &str) {
        match (self.target.as_ref(), self.characteristic) {
            (Some(device), Some(characteristic)) if self.state == ConnectionState::Ready => {
                tracing::debug!("-> {}", text);
                self.radio
                    .write_without_response(device, characteristic, text.as_bytes());
            }
            _ => tracing::debug!("Dropping {} while {:?}", text, self.state),
        }
    }

    fn fail_discovery(&mut self, device: &DeviceId, reason: &str) {
        tracing::warn!("Discovery failed on {}: {}", device, reason);
        self.radio.disconnect(device);
        self.registry.set_connected(device, false);
        self.target = None;
        self.characteristic = None;
        self.set_state(ConnectionState::Disconnected);
    }
}

impl<R: Radio> CommandLink for Communicator<R> {
    fn is_ready(&self) -> bool {
        Communicator::is_ready(self)
    }

    fn send(&mut self, command: &Command) {
        self.send_command(&command.to_string());
    }
}

impl<R: Radio> RadioEvents for Communicator<R> {
    fn on_power_state(&mut self, state: AdapterState) {
        self.adapter = state;

        if state.is_powered_on() {
            tracing::info!("Bluetooth adapter powered on");
            if self.scan_pending {
                self.request_scan();
            } else {
                self.publish();
            }
            return;
        }

        tracing::warn!("Bluetooth adapter unavailable: {}", state);
        self.registry.clear();

        if self.state.has_connection() {
            self.target = None;
            self.characteristic = None;
            self.set_state(ConnectionState::Disconnected);
        } else if self.state == ConnectionState::Scanning {
            self.set_state(ConnectionState::Idle);
        } else {
            self.publish();
        }
    }

    fn on_device_discovered(&mut self, device: DeviceId, name: Option<String>, rssi: i16) {
        if self.state != ConnectionState::Scanning {
            return;
        }

        if self.registry.record_sighting(device.clone(), name, rssi) {
            tracing::debug!("Discovered {} ({} dBm)", device, rssi);
        }
        self.publish();
    }

    fn on_connected(&mut self, device: &DeviceId) {
        if !self.is_target(device) || self.state != ConnectionState::Connecting {
            tracing::debug!("Ignoring connect callback for {}", device);
            return;
        }

        tracing::info!("Connected to {}, discovering services", device);
        self.registry.set_connected(device, true);
        self.set_state(ConnectionState::Discovering);
        self.radio.discover_services(device, &[DRAGONBOT_SERVICE_UUID]);
    }

    fn on_connect_failed(&mut self, device: &DeviceId, reason: &str) {
        if !self.is_target(device) {
            return;
        }

        tracing::warn!("Connection to {} failed: {}", device, reason);
        self.target = None;
        self.characteristic = None;
        self.set_state(ConnectionState::Disconnected);
    }

    fn on_disconnected(&mut self, device: &DeviceId) {
        self.registry.set_connected(device, false);

        if !self.is_target(device) {
            tracing::debug!("Ignoring disconnect of {}", device);
            return;
        }

        tracing::info!("Disconnected from {}", device);
        self.target = None;
        self.characteristic = None;
        self.set_state(ConnectionState::Disconnected);
    }

    fn on_services_discovered(&mut self, device: &DeviceId, services: &[Uuid]) {
        if !self.is_target(device) || self.state != ConnectionState::Discovering {
            return;
        }

        if !services.contains(&DRAGONBOT_SERVICE_UUID) {
            self.fail_discovery(device, "command service not found");
            return;
        }

        self.radio.discover_characteristics(
            device,
            DRAGONBOT_SERVICE_UUID,
            &[DRAGONBOT_CHARACTERISTIC_UUID],
        );
    }

    fn on_characteristics_discovered(
        &mut self,
        device: &DeviceId,
        service: Uuid,
        characteristics: &[Uuid],
    ) {
        if !self.is_target(device)
            || self.state != ConnectionState::Discovering
            || service != DRAGONBOT_SERVICE_UUID
        {
            return;
        }

        if !characteristics.contains(&DRAGONBOT_CHARACTERISTIC_UUID) {
            self.fail_discovery(device, "command characteristic not found");
            return;
        }

        self.characteristic = Some(DRAGONBOT_CHARACTERISTIC_UUID);
        self.radio
            .enable_notifications(device, DRAGONBOT_CHARACTERISTIC_UUID);
        tracing::info!("{} ready for commands", device);
        self.set_state(ConnectionState::Ready);
    }

    fn on_value_updated(&mut self, device: &DeviceId, characteristic: Uuid, value: &[u8]) {
        if characteristic != DRAGONBOT_CHARACTERISTIC_UUID {
            return;
        }
        tracing::debug!("<- {} {}", device, String::from_utf8_lossy(value));
    }
}
