//! serialosc discovery
//!
//! Sends list/notify requests to the discovery service and keeps the map of
//! known devices built from its replies. Replies arrive asynchronously on the
//! listener; they are told apart only by address, never by a request id.

use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::endpoints::OutboundChannel;
use crate::error::{BridgeError, Result};
use crate::osc;

/// Lowest port a device control channel may use
pub const MIN_DEVICE_PORT: u16 = 1024;

/// One device as reported by serialosc
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Serial number / identifier, e.g. "m0000001"
    pub id: String,
    /// Device class label, e.g. "monome 128" or "monome arc 4"
    pub device_type: String,
    pub port: u16,
}

impl DeviceRecord {
    /// Build a record from reply arguments, rejecting ports outside 1024-65535
    pub fn new(id: impl Into<String>, device_type: impl Into<String>, port: i32) -> Result<Self> {
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p >= MIN_DEVICE_PORT)
            .ok_or_else(|| {
                BridgeError::validation(port.to_string(), "device port must be within 1024-65535")
            })?;

        Ok(Self {
            id: id.into(),
            device_type: device_type.into(),
            port,
        })
    }
}

/// Effect of a device report on the known-devices map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceChange {
    /// First report for this id
    Added,
    /// Known id re-announced on another port
    PortChanged { previous: u16 },
    /// Known id, same port
    Unchanged,
}

/// Where discovery replies should be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerAddress {
    pub host: String,
    pub port: u16,
}

pub struct DiscoveryHandler {
    channel: Option<OutboundChannel>,
    listener: ListenerAddress,
    devices: HashMap<String, DeviceRecord>,
}

impl DiscoveryHandler {
    /// `channel` is `None` when the discovery endpoint could not be opened;
    /// requests are then logged and dropped.
    pub fn new(channel: Option<OutboundChannel>, listener: ListenerAddress) -> Self {
        Self {
            channel,
            listener,
            devices: HashMap::new(),
        }
    }

    /// Ask serialosc to report every attached device to the given listener
    pub fn request_device_list(&self, listener_host: &str, listener_port: u16) {
        debug!("Requesting device list for {}:{}", listener_host, listener_port);
        self.send(osc::list_request(listener_host, listener_port));
    }

    /// Ask serialosc for the next add/remove notification
    ///
    /// The subscription is not durable on the serialosc side, so it is
    /// re-issued after every notification.
    pub fn subscribe_to_changes(&self, listener_host: &str, listener_port: u16) {
        debug!("Subscribing {}:{} to device changes", listener_host, listener_port);
        self.send(osc::notify_request(listener_host, listener_port));
    }

    /// List request addressed to our own listener
    pub fn detect(&self) {
        self.request_device_list(&self.listener.host, self.listener.port);
    }

    /// Notify request addressed to our own listener
    pub fn subscribe(&self) {
        self.subscribe_to_changes(&self.listener.host, self.listener.port);
    }

    /// Record a `/serialosc/device` reply
    pub fn handle_device_info(&mut self, record: DeviceRecord) -> DeviceChange {
        self.record(record)
    }

    /// Record a `/serialosc/add` notification and refresh the subscription
    pub fn handle_device_added(&mut self, record: DeviceRecord) -> DeviceChange {
        let change = self.record(record);
        self.subscribe();
        change
    }

    /// Drop a device on `/serialosc/remove` and refresh the subscription
    pub fn handle_device_removed(&mut self, id: &str) -> Option<DeviceRecord> {
        let removed = self.devices.remove(id);
        match &removed {
            Some(record) => info!("Device {} ({}) removed", record.id, record.device_type),
            None => debug!("Removal of unknown device {}", id),
        }
        self.subscribe();
        removed
    }

    pub fn device(&self, id: &str) -> Option<&DeviceRecord> {
        self.devices.get(id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }

    pub fn has_channel(&self) -> bool {
        self.channel.is_some()
    }

    fn record(&mut self, record: DeviceRecord) -> DeviceChange {
        match self.devices.get_mut(&record.id) {
            Some(known) if known.port == record.port => DeviceChange::Unchanged,
            Some(known) => {
                let previous = known.port;
                info!(
                    "Device {} moved from port {} to {}",
                    record.id, previous, record.port
                );
                *known = record;
                DeviceChange::PortChanged { previous }
            }
            None => {
                info!(
                    "Device {} ({}) on port {}",
                    record.id, record.device_type, record.port
                );
                self.devices.insert(record.id.clone(), record);
                DeviceChange::Added
            }
        }
    }

    fn send(&self, message: rosc::OscMessage) {
        let Some(channel) = &self.channel else {
            warn!("No discovery channel, dropping {}", message.addr);
            return;
        };
        if let Err(e) = channel.send(message) {
            warn!("Discovery request failed: {}", e);
        }
    }
}
