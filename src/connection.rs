//! Connection manager
//!
//! Decides which single device the bridge is bound to and which port the
//! device-out endpoint uses. The endpoint set is fixed once a cycle is
//! initialized, so every change of target port is expressed as effects for
//! the host: persist the new port, then restart.

use std::fmt;
use tracing::{debug, info, warn};

use crate::discovery::{DeviceRecord, MIN_DEVICE_PORT};
use crate::error::{BridgeError, Result};

/// Connection state for the current cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No device-out endpoint
    Unbound,
    /// A new target port is persisted; nothing changes until the next cycle
    PendingRestart { port: u16 },
    /// Device-out endpoint is open and the handshake was sent
    Connected { port: u16 },
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Unbound => write!(f, "unbound"),
            ConnectionState::PendingRestart { port } => write!(f, "pending restart (port {})", port),
            ConnectionState::Connected { port } => write!(f, "connected (port {})", port),
        }
    }
}

/// Side effect requested from the host, executed in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Write the device port setting
    PersistPort(u16),
    /// Tear down every endpoint and run a new init cycle
    Restart,
}

/// Parse a device port setting: empty or 0 means "no device", otherwise 1024-65535
pub fn validate_port(raw: &str) -> Result<u16> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }

    let value: i64 = trimmed
        .parse()
        .map_err(|_| BridgeError::validation(raw, "not a number"))?;

    if value < 0 {
        return Err(BridgeError::validation(raw, "port cannot be negative"));
    }
    if value != 0 && value < i64::from(MIN_DEVICE_PORT) {
        return Err(BridgeError::validation(raw, "ports below 1024 are reserved"));
    }
    if value > i64::from(u16::MAX) {
        return Err(BridgeError::validation(raw, "port is above 65535"));
    }

    Ok(value as u16)
}

pub struct ConnectionManager {
    /// Last valid persisted port, 0 when unbound
    configured_port: u16,
    state: ConnectionState,
    /// First device id claimed this cycle
    bound_device: Option<String>,
    /// Set once the binding was released; any device may then claim
    rebind: bool,
    /// Repairs for the persisted setting, handed to the host after init
    startup_effects: Vec<Effect>,
}

impl ConnectionManager {
    /// Start a cycle from the persisted setting
    ///
    /// An invalid persisted value is logged, treated as unbound and
    /// queued to be overwritten with 0.
    pub fn from_persisted(raw: &str) -> Self {
        let (configured_port, startup_effects) = match validate_port(raw) {
            Ok(port) => (port, Vec::new()),
            Err(e) => {
                warn!("{}; starting unbound", e);
                (0, vec![Effect::PersistPort(0)])
            }
        };

        Self {
            configured_port,
            state: ConnectionState::Unbound,
            bound_device: None,
            rebind: false,
            startup_effects,
        }
    }

    /// Effects the host runs once the cycle is initialized
    pub fn take_startup_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.startup_effects)
    }

    pub fn configured_port(&self) -> u16 {
        self.configured_port
    }

    /// Port the device-out endpoint should open, if any
    pub fn target_port(&self) -> Option<u16> {
        (self.configured_port != 0).then_some(self.configured_port)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn bound_device(&self) -> Option<&str> {
        self.bound_device.as_deref()
    }

    pub fn mark_connected(&mut self) {
        self.state = ConnectionState::Connected {
            port: self.configured_port,
        };
    }

    pub fn mark_open_failed(&mut self, error: &BridgeError) {
        warn!(
            "Could not open device port {}: {}",
            self.configured_port, error
        );
        self.state = ConnectionState::Unbound;
    }

    /// React to a device reported by discovery (list reply or add notification)
    ///
    /// The first device id seen in a cycle wins; reports from any other id
    /// are ignored until that device is removed. While connected, only the
    /// device on the open port can make the first claim.
    pub fn on_device_reported(&mut self, record: &DeviceRecord) -> Vec<Effect> {
        if let ConnectionState::PendingRestart { port } = self.state {
            debug!(
                "Restart to port {} pending, ignoring report from {}",
                port, record.id
            );
            return Vec::new();
        }

        if let Some(bound) = &self.bound_device {
            if *bound != record.id {
                info!(
                    "Ignoring {} ({}) on port {}: already bound to {}",
                    record.id, record.device_type, record.port, bound
                );
                return Vec::new();
            }
        }

        if let ConnectionState::Connected { port } = self.state {
            if self.bound_device.is_none() && !self.rebind && record.port != port {
                info!(
                    "Ignoring {} ({}) on port {}: connected on port {}",
                    record.id, record.device_type, record.port, port
                );
                return Vec::new();
            }
        }

        self.bound_device = Some(record.id.clone());

        if record.port == self.configured_port {
            debug!("Device {} already on configured port {}", record.id, record.port);
            return Vec::new();
        }

        info!(
            "Device {} ({}) reports port {}, configured port is {}",
            record.id, record.device_type, record.port, self.configured_port
        );
        self.request_restart(record.port)
    }

    /// Release the binding when the bound device goes away
    ///
    /// The device-out endpoint stays as it is; another device can be claimed
    /// by the next report.
    pub fn on_device_removed(&mut self, id: &str) {
        if self.bound_device.as_deref() == Some(id) {
            warn!("Bound device {} went away", id);
            self.bound_device = None;
            self.rebind = true;
        }
    }

    /// Drop the current binding so the next reported device decides
    ///
    /// Used by detect: a device that vanished without a remove notification
    /// must not keep the bridge pinned to its port.
    pub fn release_binding(&mut self) {
        if let Some(id) = self.bound_device.take() {
            info!("Released binding to {}", id);
        }
        self.rebind = true;
    }

    /// Apply a manual edit of the device port setting
    ///
    /// Invalid values are reverted to the last valid port without a restart.
    /// A different valid value (0 disconnects) is persisted and restarts.
    pub fn apply_port_edit(&mut self, raw: &str) -> Vec<Effect> {
        if let ConnectionState::PendingRestart { port } = self.state {
            debug!("Restart to port {} pending, ignoring edit '{}'", port, raw);
            return Vec::new();
        }

        match validate_port(raw) {
            Err(e) => {
                warn!("{}; reverting to {}", e, self.configured_port);
                vec![Effect::PersistPort(self.configured_port)]
            }
            Ok(port) if port == self.configured_port => Vec::new(),
            Ok(port) => {
                info!("Device port changed to {}", port);
                self.request_restart(port)
            }
        }
    }

    fn request_restart(&mut self, port: u16) -> Vec<Effect> {
        self.configured_port = port;
        self.state = ConnectionState::PendingRestart { port };
        vec![Effect::PersistPort(port), Effect::Restart]
    }
}
