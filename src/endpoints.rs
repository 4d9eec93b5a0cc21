//! Endpoint registry
//!
//! Wraps the three network roles and enforces that every endpoint is created
//! during the single initialization phase of a cycle. Once sealed, the set can
//! only change by tearing the whole registry down and starting a new cycle.

use rosc::OscMessage;
use std::fmt;
use std::sync::Arc;
use tracing::{info, trace, warn};

use crate::error::{BridgeError, Result};
use crate::osc::AddressSpace;
use crate::transport::{OscSink, Transport};

/// Network role of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointRole {
    /// Outgoing channel to the serialosc discovery service
    DiscoveryOut,
    /// Inbound listener for discovery replies and device events
    ListenerIn,
    /// Outgoing channel to the bound device
    DeviceOut,
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EndpointRole::DiscoveryOut => "discovery-out",
            EndpointRole::ListenerIn => "listener-in",
            EndpointRole::DeviceOut => "device-out",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub role: EndpointRole,
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}:{}", self.role, self.host, self.port)
    }
}

/// Cloneable handle for sending on an outbound endpoint
#[derive(Clone)]
pub struct OutboundChannel {
    endpoint: Endpoint,
    sink: Arc<dyn OscSink>,
}

impl OutboundChannel {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Fire-and-forget send; there is no delivery confirmation
    pub fn send(&self, message: OscMessage) -> Result<()> {
        trace!("OSC out [{}]: {} {:?}", self.endpoint, message.addr, message.args);
        self.sink
            .send(&message)
            .map_err(|e| BridgeError::transport(self.endpoint.to_string(), e))
    }
}

impl fmt::Debug for OutboundChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundChannel")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initializing,
    Sealed,
}

/// Creates and records the endpoints of one cycle
pub struct EndpointRegistry<T: Transport> {
    transport: T,
    phase: Phase,
    endpoints: Vec<Endpoint>,
}

impl<T: Transport> EndpointRegistry<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            phase: Phase::Initializing,
            endpoints: Vec::new(),
        }
    }

    /// Open an outgoing UDP channel to `host:port`
    ///
    /// Fails with `LifecycleViolation` once the registry is sealed and with
    /// `Transport` if the socket cannot be bound or connected.
    pub fn create_outbound_channel(
        &mut self,
        role: EndpointRole,
        host: &str,
        port: u16,
    ) -> Result<OutboundChannel> {
        if self.phase == Phase::Sealed {
            return Err(BridgeError::lifecycle("create outbound channel"));
        }
        debug_assert_ne!(role, EndpointRole::ListenerIn);

        let endpoint = Endpoint {
            role,
            host: host.to_string(),
            port,
        };

        let sink = self
            .transport
            .connect(host, port)
            .map_err(|e| BridgeError::transport(endpoint.to_string(), e))?;

        info!("Opened {}", endpoint);
        self.endpoints.push(endpoint.clone());

        Ok(OutboundChannel { endpoint, sink })
    }

    /// Bind the inbound listener on `port`, dispatching through `space`
    pub fn create_inbound_listener(&mut self, port: u16, space: AddressSpace) -> Result<Endpoint> {
        if self.phase == Phase::Sealed {
            return Err(BridgeError::lifecycle("create inbound listener"));
        }

        let endpoint = Endpoint {
            role: EndpointRole::ListenerIn,
            host: "0.0.0.0".to_string(),
            port,
        };

        self.transport
            .listen(port, space)
            .map_err(|e| BridgeError::transport(endpoint.to_string(), e))?;

        info!("Opened {}", endpoint);
        self.endpoints.push(endpoint.clone());

        Ok(endpoint)
    }

    /// End the initialization phase
    pub fn seal(&mut self) {
        if self.phase == Phase::Sealed {
            warn!("Endpoint registry sealed twice");
        }
        self.phase = Phase::Sealed;
    }

    pub fn is_sealed(&self) -> bool {
        self.phase == Phase::Sealed
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn has_role(&self, role: EndpointRole) -> bool {
        self.endpoints.iter().any(|e| e.role == role)
    }

    /// Give the transport back so the host can release its sockets
    pub fn into_transport(self) -> T {
        self.transport
    }
}
