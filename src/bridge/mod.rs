//! Bridge context for one init cycle
//!
//! Owns discovery, connection and feedback state plus the optional device
//! session. Every inbound event, settings edit and console command goes
//! through this one object on the host's dispatch loop, and anything the
//! host must do (persist, restart) comes back as [`Effect`]s.

use tracing::{debug, error, info, trace};

use crate::config::AppConfig;
use crate::connection::{ConnectionManager, ConnectionState, Effect};
use crate::discovery::{DeviceChange, DeviceRecord, DiscoveryHandler, ListenerAddress};
use crate::endpoints::{Endpoint, EndpointRegistry, EndpointRole};
use crate::feedback::FeedbackState;
use crate::osc::{AddressSpace, InboundEvent};
use crate::session::{DeviceSession, SessionState};
use crate::transport::Transport;

/// Snapshot for the console `status` command
#[derive(Debug, Clone)]
pub struct BridgeStatus {
    pub connection: ConnectionState,
    pub session: SessionState,
    pub configured_port: u16,
    pub bound_device: Option<String>,
    pub devices: Vec<DeviceRecord>,
    pub endpoints: Vec<Endpoint>,
}

pub struct Bridge {
    listener: ListenerAddress,
    endpoints: Vec<Endpoint>,
    discovery: DiscoveryHandler,
    connection: ConnectionManager,
    session: Option<DeviceSession>,
    feedback: FeedbackState,
}

impl Bridge {
    /// Run the initialization phase of a cycle
    ///
    /// Creates every endpoint, opens the device session when a port is
    /// persisted and seals the registry. Endpoint failures are logged and
    /// leave the bridge degraded rather than failing the cycle.
    pub fn init<T: Transport>(
        config: &AppConfig,
        persisted_port: &str,
        registry: &mut EndpointRegistry<T>,
    ) -> Self {
        let net = &config.network;
        let prefix = &config.device.prefix;
        let listener = ListenerAddress {
            host: net.host.clone(),
            port: net.listener_port,
        };

        let discovery_channel = match registry.create_outbound_channel(
            EndpointRole::DiscoveryOut,
            &net.host,
            net.serialosc_port,
        ) {
            Ok(channel) => Some(channel),
            Err(e) => {
                error!("Could not open serialosc port {}: {}", net.serialosc_port, e);
                None
            }
        };

        if let Err(e) =
            registry.create_inbound_listener(net.listener_port, AddressSpace::serialosc(prefix))
        {
            error!("Could not create listener port {}: {}", net.listener_port, e);
        }

        let mut connection = ConnectionManager::from_persisted(persisted_port);
        let session = match connection.target_port() {
            None => {
                info!("No device port configured");
                None
            }
            Some(port) => {
                info!("Connecting to device on port {}", port);
                match registry.create_outbound_channel(EndpointRole::DeviceOut, &net.host, port) {
                    Ok(channel) => {
                        let session =
                            DeviceSession::open(channel, &listener, prefix, config.device.class);
                        connection.mark_connected();
                        Some(session)
                    }
                    Err(e) => {
                        connection.mark_open_failed(&e);
                        None
                    }
                }
            }
        };

        registry.seal();

        let bridge = Self {
            endpoints: registry.endpoints().to_vec(),
            discovery: DiscoveryHandler::new(discovery_channel, listener.clone()),
            listener,
            connection,
            session,
            feedback: FeedbackState::new(),
        };

        if config.discovery.subscribe {
            bridge.discovery.subscribe();
        }
        if config.discovery.auto_detect {
            bridge.discovery.detect();
        }

        info!("Bridge initialized: {}", bridge.connection.state());
        bridge
    }

    /// Route one inbound event
    pub fn handle_event(&mut self, event: InboundEvent) -> Vec<Effect> {
        debug!("{}", event);

        match event {
            InboundEvent::DeviceInfo(record) => {
                let change = self.discovery.handle_device_info(record.clone());
                self.on_device_reported(change, &record)
            }
            InboundEvent::DeviceAdded(record) => {
                let change = self.discovery.handle_device_added(record.clone());
                self.on_device_reported(change, &record)
            }
            InboundEvent::DeviceRemoved { id } => {
                self.discovery.handle_device_removed(&id);
                self.connection.on_device_removed(&id);
                Vec::new()
            }
            event => {
                self.route_feedback(&event);
                Vec::new()
            }
        }
    }

    /// The "detect" trigger: release the bound device and ask serialosc
    /// for the device list, so the first reply picks the device
    pub fn detect(&mut self) {
        info!("Detecting devices");
        self.connection.release_binding();
        self.discovery.detect();
    }

    /// Effects produced while initializing, such as repairing an invalid
    /// persisted port
    pub fn take_startup_effects(&mut self) -> Vec<Effect> {
        self.connection.take_startup_effects()
    }

    /// Apply a settings-change notification for the device port
    pub fn apply_port_edit(&mut self, raw: &str) -> Vec<Effect> {
        self.connection.apply_port_edit(raw)
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn discovery(&self) -> &DiscoveryHandler {
        &self.discovery
    }

    pub fn feedback(&self) -> &FeedbackState {
        &self.feedback
    }

    pub fn listener(&self) -> &ListenerAddress {
        &self.listener
    }

    pub fn session_state(&self) -> SessionState {
        self.session
            .as_ref()
            .map(DeviceSession::state)
            .unwrap_or(SessionState::NoSession)
    }

    pub fn status(&self) -> BridgeStatus {
        let mut devices: Vec<DeviceRecord> = self.discovery.devices().cloned().collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));

        BridgeStatus {
            connection: self.connection.state(),
            session: self.session_state(),
            configured_port: self.connection.configured_port(),
            bound_device: self.connection.bound_device().map(str::to_string),
            devices,
            endpoints: self.endpoints.clone(),
        }
    }

    fn on_device_reported(&mut self, change: DeviceChange, record: &DeviceRecord) -> Vec<Effect> {
        // Replays are no-ops once a device is bound; an unbound cycle may
        // still claim a device it already knew about
        if change == DeviceChange::Unchanged && self.connection.bound_device().is_some() {
            trace!("Device {} unchanged", record.id);
            return Vec::new();
        }
        self.connection.on_device_reported(record)
    }

    fn route_feedback(&mut self, event: &InboundEvent) {
        let Some(session) = self.session.as_ref().filter(|s| s.is_ready()) else {
            trace!("No device session, dropping {}", event);
            return;
        };

        let commands = self.feedback.on_event(event);
        session.send_all(commands);
    }
}

#[cfg(test)]
mod tests;
