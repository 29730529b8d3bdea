//! btleplug backend for a [`RequestQueue`].
//!
//! One task drains the queue and executes each [`RadioRequest`] to
//! completion before taking the next, so the adapter sees requests in the
//! order the communicator issued them. Outcomes are reported as
//! [`RadioEvent`]s on an unbounded channel; the owner of the communicator
//! drains that channel and dispatches each event, so all state changes stay
//! on one task.

use crate::ble::radio::{RadioEvent, RadioRequest, RequestQueue};
use crate::ble::types::{AdapterState, BleError, DeviceId};
use btleplug::api::{
    Central, CentralEvent, CentralState, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

/// Executes radio requests against the first BLE adapter.
pub struct BtleplugRadio {
    adapter: Adapter,
    events: UnboundedSender<RadioEvent>,
    /// Last peripheral looked up, reused while requests target it
    cached: Option<(DeviceId, Peripheral)>,
}

impl BtleplugRadio {
    /// Open the first BLE adapter, start forwarding its events and return
    /// the queue that feeds it.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn initialize(events: UnboundedSender<RadioEvent>) -> Result<RequestQueue, BleError> {
        tracing::info!("Initializing BLE adapter");

        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(BleError::AdapterNotFound)?;

        tokio::spawn(process_central_events(adapter.clone(), events.clone()));

        let initial = match adapter.adapter_state().await {
            Ok(state) => map_central_state(state),
            Err(e) => {
                tracing::warn!("Could not read adapter state, assuming powered on: {}", e);
                AdapterState::PoweredOn
            }
        };
        let _ = events.send(RadioEvent::PowerState(initial));

        let (queue, requests) = RequestQueue::new();
        let radio = Self {
            adapter,
            events,
            cached: None,
        };
        tokio::spawn(radio.process_requests(requests));

        tracing::info!("BLE adapter initialized");
        Ok(queue)
    }

    async fn process_requests(mut self, mut rx: UnboundedReceiver<RadioRequest>) {
        while let Some(request) = rx.recv().await {
            self.execute(request).await;
        }
        tracing::debug!("Radio request queue closed");
    }

    fn emit(&self, event: RadioEvent) {
        let _ = self.events.send(event);
    }

    async fn execute(&mut self, request: RadioRequest) {
        match request {
            RadioRequest::StartScan => {
                if let Err(e) = self.adapter.start_scan(ScanFilter::default()).await {
                    tracing::error!("Failed to start scanning: {}", e);
                }
            }
            RadioRequest::StopScan => {
                if let Err(e) = self.adapter.stop_scan().await {
                    tracing::warn!("Failed to stop scanning: {}", e);
                }
            }
            RadioRequest::Connect(device) => {
                let event = match self.connect(&device).await {
                    Ok(()) => RadioEvent::Connected(device),
                    Err(e) => RadioEvent::ConnectFailed {
                        device,
                        reason: e.to_string(),
                    },
                };
                self.emit(event);
            }
            RadioRequest::Disconnect(device) => {
                if let Err(e) = self.disconnect(&device).await {
                    tracing::warn!("Failed to disconnect {}: {}", device, e);
                }
            }
            RadioRequest::DiscoverServices { device, services } => {
                // An empty result makes the communicator tear the link down
                let found = self
                    .discover_services(&device, &services)
                    .await
                    .unwrap_or_else(|e| {
                        tracing::warn!("Service discovery on {} failed: {}", device, e);
                        Vec::new()
                    });
                self.emit(RadioEvent::ServicesDiscovered {
                    device,
                    services: found,
                });
            }
            RadioRequest::DiscoverCharacteristics {
                device,
                service,
                characteristics,
            } => {
                let found = self
                    .discover_characteristics(&device, service, &characteristics)
                    .await
                    .unwrap_or_else(|e| {
                        tracing::warn!("Characteristic discovery on {} failed: {}", device, e);
                        Vec::new()
                    });
                self.emit(RadioEvent::CharacteristicsDiscovered {
                    device,
                    service,
                    characteristics: found,
                });
            }
            RadioRequest::EnableNotifications {
                device,
                characteristic,
            } => {
                if let Err(e) = self.enable_notifications(&device, characteristic).await {
                    tracing::warn!("Failed to enable notifications on {}: {}", device, e);
                }
            }
            RadioRequest::Write {
                device,
                characteristic,
                data,
            } => {
                if let Err(e) = self.write(&device, characteristic, &data).await {
                    tracing::warn!("Write to {} dropped: {}", device, e);
                }
            }
            RadioRequest::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    async fn peripheral(&mut self, device: &DeviceId) -> Result<Peripheral, BleError> {
        if let Some((id, peripheral)) = &self.cached {
            if id == device {
                return Ok(peripheral.clone());
            }
        }

        let peripheral = find_peripheral(&self.adapter, device).await?;
        self.cached = Some((device.clone(), peripheral.clone()));
        Ok(peripheral)
    }

    async fn connect(&mut self, device: &DeviceId) -> Result<(), BleError> {
        let peripheral = self.peripheral(device).await?;
        peripheral.connect().await?;
        Ok(())
    }

    async fn disconnect(&mut self, device: &DeviceId) -> Result<(), BleError> {
        let peripheral = self.peripheral(device).await?;
        self.cached = None;
        peripheral.disconnect().await?;
        Ok(())
    }

    async fn discover_services(
        &mut self,
        device: &DeviceId,
        wanted: &[Uuid],
    ) -> Result<Vec<Uuid>, BleError> {
        let peripheral = self.peripheral(device).await?;
        peripheral.discover_services().await?;

        Ok(peripheral
            .services()
            .into_iter()
            .map(|s| s.uuid)
            .filter(|uuid| wanted.is_empty() || wanted.contains(uuid))
            .collect())
    }

    async fn discover_characteristics(
        &mut self,
        device: &DeviceId,
        service: Uuid,
        wanted: &[Uuid],
    ) -> Result<Vec<Uuid>, BleError> {
        let peripheral = self.peripheral(device).await?;

        Ok(peripheral
            .services()
            .into_iter()
            .filter(|s| s.uuid == service)
            .flat_map(|s| s.characteristics.into_iter().map(|c| c.uuid))
            .filter(|uuid| wanted.is_empty() || wanted.contains(uuid))
            .collect())
    }

    /// Subscribe, then forward notifications on a separate task so the
    /// queue keeps moving.
    async fn enable_notifications(
        &mut self,
        device: &DeviceId,
        characteristic: Uuid,
    ) -> Result<(), BleError> {
        let peripheral = self.peripheral(device).await?;
        if let Some(c) = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic)
        {
            peripheral.subscribe(&c).await?;
        }
        let mut notifications = peripheral.notifications().await?;

        let tx = self.events.clone();
        let device = device.clone();
        tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                let event = RadioEvent::ValueUpdated {
                    device: device.clone(),
                    characteristic: notification.uuid,
                    value: notification.value,
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
        });

        Ok(())
    }

    async fn write(
        &mut self,
        device: &DeviceId,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<(), BleError> {
        let peripheral = self.peripheral(device).await?;
        let Some(target) = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic)
        else {
            tracing::warn!("Characteristic {} missing on {}", characteristic, device);
            return Ok(());
        };

        peripheral
            .write(&target, data, WriteType::WithoutResponse)
            .await?;
        Ok(())
    }
}

/// Forward adapter-level events until the channel closes.
async fn process_central_events(adapter: Adapter, tx: UnboundedSender<RadioEvent>) {
    let mut events = match adapter.events().await {
        Ok(events) => events,
        Err(e) => {
            tracing::error!("Failed to get adapter events: {}", e);
            return;
        }
    };

    while let Some(event) = events.next().await {
        let forwarded = match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                let peripheral = match adapter.peripheral(&id).await {
                    Ok(p) => p,
                    Err(_) => continue,
                };
                match describe_peripheral(&peripheral).await {
                    Some(event) => event,
                    None => continue,
                }
            }
            CentralEvent::DeviceDisconnected(id) => {
                RadioEvent::Disconnected(DeviceId::new(id.to_string()))
            }
            CentralEvent::StateUpdate(state) => RadioEvent::PowerState(map_central_state(state)),
            _ => continue,
        };

        if tx.send(forwarded).is_err() {
            break;
        }
    }
}

fn map_central_state(state: CentralState) -> AdapterState {
    match state {
        CentralState::PoweredOn => AdapterState::PoweredOn,
        CentralState::PoweredOff => AdapterState::PoweredOff,
        _ => {
            // Scans requested meanwhile stay pending until a power-on report
            tracing::warn!("Adapter reported an unknown state; scanning is on hold");
            AdapterState::Unknown
        }
    }
}

async fn describe_peripheral(peripheral: &Peripheral) -> Option<RadioEvent> {
    let properties = peripheral.properties().await.ok()??;

    Some(RadioEvent::DeviceDiscovered {
        device: DeviceId::new(peripheral.id().to_string()),
        name: properties.local_name,
        rssi: properties.rssi.unwrap_or(i16::MIN),
    })
}

async fn find_peripheral(adapter: &Adapter, device: &DeviceId) -> Result<Peripheral, BleError> {
    adapter
        .peripherals()
        .await?
        .into_iter()
        .find(|p| p.id().to_string() == device.as_str())
        .ok_or_else(|| BleError::DeviceNotFound(device.clone()))
}
