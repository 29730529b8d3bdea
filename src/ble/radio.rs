//! Seam between the connection policy and the platform radio stack.
//!
//! [`Radio`] is what the communicator asks of the radio. Every request is
//! fire-and-forget; outcomes come back later through [`RadioEvents`].
//! [`RequestQueue`] turns those calls into [`RadioRequest`] values on one
//! channel so a backend can execute them strictly in issue order.

use crate::ble::types::{AdapterState, DeviceId};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Requests issued to the external radio collaborator.
pub trait Radio {
    /// Begin passive discovery with no service filter.
    fn start_scan(&mut self);

    fn stop_scan(&mut self);

    fn connect(&mut self, device: &DeviceId);

    /// Close or cancel the connection to `device`.
    fn disconnect(&mut self, device: &DeviceId);

    /// Discover the given services on a connected device.
    fn discover_services(&mut self, device: &DeviceId, services: &[Uuid]);

    /// Discover the given characteristics of one service.
    fn discover_characteristics(&mut self, device: &DeviceId, service: Uuid, characteristics: &[Uuid]);

    fn enable_notifications(&mut self, device: &DeviceId, characteristic: Uuid);

    /// Write without waiting for an acknowledgment.
    fn write_without_response(&mut self, device: &DeviceId, characteristic: Uuid, data: &[u8]);
}

/// Callbacks delivered by the radio, one method per event kind.
pub trait RadioEvents {
    fn on_power_state(&mut self, state: AdapterState);

    fn on_device_discovered(&mut self, device: DeviceId, name: Option<String>, rssi: i16);

    fn on_connected(&mut self, device: &DeviceId);

    fn on_connect_failed(&mut self, device: &DeviceId, reason: &str);

    fn on_disconnected(&mut self, device: &DeviceId);

    fn on_services_discovered(&mut self, device: &DeviceId, services: &[Uuid]);

    fn on_characteristics_discovered(
        &mut self,
        device: &DeviceId,
        service: Uuid,
        characteristics: &[Uuid],
    );

    fn on_value_updated(&mut self, device: &DeviceId, characteristic: Uuid, value: &[u8]);
}

/// A radio callback carried over a channel to the thread that owns the
/// communicator.
#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent {
    PowerState(AdapterState),
    DeviceDiscovered {
        device: DeviceId,
        name: Option<String>,
        rssi: i16,
    },
    Connected(DeviceId),
    ConnectFailed {
        device: DeviceId,
        reason: String,
    },
    Disconnected(DeviceId),
    ServicesDiscovered {
        device: DeviceId,
        services: Vec<Uuid>,
    },
    CharacteristicsDiscovered {
        device: DeviceId,
        service: Uuid,
        characteristics: Vec<Uuid>,
    },
    ValueUpdated {
        device: DeviceId,
        characteristic: Uuid,
        value: Vec<u8>,
    },
}

impl RadioEvent {
    /// Deliver this event to `sink`.
    pub fn dispatch<S: RadioEvents + ?Sized>(self, sink: &mut S) {
        match self {
            RadioEvent::PowerState(state) => sink.on_power_state(state),
            RadioEvent::DeviceDiscovered { device, name, rssi } => {
                sink.on_device_discovered(device, name, rssi)
            }
            RadioEvent::Connected(device) => sink.on_connected(&device),
            RadioEvent::ConnectFailed { device, reason } => {
                sink.on_connect_failed(&device, &reason)
            }
            RadioEvent::Disconnected(device) => sink.on_disconnected(&device),
            RadioEvent::ServicesDiscovered { device, services } => {
                sink.on_services_discovered(&device, &services)
            }
            RadioEvent::CharacteristicsDiscovered {
                device,
                service,
                characteristics,
            } => sink.on_characteristics_discovered(&device, service, &characteristics),
            RadioEvent::ValueUpdated {
                device,
                characteristic,
                value,
            } => sink.on_value_updated(&device, characteristic, &value),
        }
    }
}

/// A [`Radio`] call captured as a value.
#[derive(Debug)]
pub enum RadioRequest {
    StartScan,
    StopScan,
    Connect(DeviceId),
    Disconnect(DeviceId),
    DiscoverServices {
        device: DeviceId,
        services: Vec<Uuid>,
    },
    DiscoverCharacteristics {
        device: DeviceId,
        service: Uuid,
        characteristics: Vec<Uuid>,
    },
    EnableNotifications {
        device: DeviceId,
        characteristic: Uuid,
    },
    Write {
        device: DeviceId,
        characteristic: Uuid,
        data: Vec<u8>,
    },
    /// Signalled once every earlier request has been executed
    Flush(oneshot::Sender<()>),
}

/// [`Radio`] that enqueues every call on a single channel.
///
/// The consumer sees requests in exactly the order they were made, so a
/// scan stop issued before a connect, or a write issued before a
/// disconnect, is executed first.
#[derive(Debug, Clone)]
pub struct RequestQueue {
    tx: mpsc::UnboundedSender<RadioRequest>,
}

impl RequestQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RadioRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn push(&self, request: RadioRequest) {
        if self.tx.send(request).is_err() {
            tracing::warn!("Radio request queue closed, request dropped");
        }
    }

    /// Wait until every request issued so far has been executed.
    ///
    /// Returns immediately if the consumer has gone away.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(RadioRequest::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

impl Radio for RequestQueue {
    fn start_scan(&mut self) {
        self.push(RadioRequest::StartScan);
    }

    fn stop_scan(&mut self) {
        self.push(RadioRequest::StopScan);
    }

    fn connect(&mut self, device: &DeviceId) {
        self.push(RadioRequest::Connect(device.clone()));
    }

    fn disconnect(&mut self, device: &DeviceId) {
        self.push(RadioRequest::Disconnect(device.clone()));
    }

    fn discover_services(&mut self, device: &DeviceId, services: &[Uuid]) {
        self.push(RadioRequest::DiscoverServices {
            device: device.clone(),
            services: services.to_vec(),
        });
    }

    fn discover_characteristics(&mut self, device: &DeviceId, service: Uuid, characteristics: &[Uuid]) {
        self.push(RadioRequest::DiscoverCharacteristics {
            device: device.clone(),
            service,
            characteristics: characteristics.to_vec(),
        });
    }

    fn enable_notifications(&mut self, device: &DeviceId, characteristic: Uuid) {
        self.push(RadioRequest::EnableNotifications {
            device: device.clone(),
            characteristic,
        });
    }

    fn write_without_response(&mut self, device: &DeviceId, characteristic: Uuid, data: &[u8]) {
        self.push(RadioRequest::Write {
            device: device.clone(),
            characteristic,
            data: data.to_vec(),
        });
    }
}
