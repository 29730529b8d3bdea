//! In-memory set of peripherals seen during the current scan.

use crate::ble::types::{Device, DeviceId};

/// Discovered devices, deduplicated by identity and kept in first-seen order.
#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an advertisement sighting.
    ///
    /// Returns `true` when the device was not known before. A repeat sighting
    /// only refreshes the signal strength; position in the list is kept.
    pub fn record_sighting(&mut self, id: DeviceId, name: Option<String>, rssi: i16) -> bool {
        if let Some(device) = self.devices.iter_mut().find(|d| d.id == id) {
            device.rssi = rssi;
            return false;
        }

        self.devices.push(Device::new(id, name, rssi));
        true
    }

    pub fn get(&self, id: &DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| &d.id == id)
    }

    pub fn set_connected(&mut self, id: &DeviceId, connected: bool) {
        if let Some(device) = self.devices.iter_mut().find(|d| &d.id == id) {
            device.is_connected = connected;
        }
    }

    /// First device whose name contains `filter`, ignoring case.
    pub fn find_by_name(&self, filter: &str) -> Option<&Device> {
        let filter = filter.to_lowercase();
        self.devices.iter().find(|d| {
            d.name
                .as_deref()
                .is_some_and(|name| name.to_lowercase().contains(&filter))
        })
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn clear(&mut self) {
        self.devices.clear();
    }
}
