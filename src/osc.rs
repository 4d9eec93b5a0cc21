//! serialosc OSC vocabulary
//!
//! Address patterns, inbound event parsing and outbound command encoding.
//! Framing and argument encoding are left to `rosc`; everything here works on
//! already-decoded `OscMessage` values.

use rosc::{OscMessage, OscType};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

use crate::discovery::DeviceRecord;

/// Fixed addresses of the serialosc discovery service and device system namespace
pub mod address {
    pub const DEVICE: &str = "/serialosc/device";
    pub const ADD: &str = "/serialosc/add";
    pub const REMOVE: &str = "/serialosc/remove";
    pub const LIST: &str = "/serialosc/list";
    pub const NOTIFY: &str = "/serialosc/notify";

    pub const SYS_HOST: &str = "/sys/host";
    pub const SYS_PORT: &str = "/sys/port";
    pub const SYS_PREFIX: &str = "/sys/prefix";
}

/// Kind of inbound message a registered address pattern maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundKind {
    DeviceInfo,
    DeviceAdded,
    DeviceRemoved,
    EncoderDelta,
    EncoderKey,
    GridKey,
    Tilt,
}

impl InboundKind {
    /// OSC type tags the message must carry, in order
    pub fn type_tags(self) -> &'static str {
        match self {
            InboundKind::DeviceInfo | InboundKind::DeviceAdded => ",ssi",
            InboundKind::DeviceRemoved => ",s",
            InboundKind::EncoderDelta | InboundKind::EncoderKey => ",ii",
            InboundKind::GridKey => ",iii",
            InboundKind::Tilt => ",iiii",
        }
    }

    fn parse(self, args: &[OscType]) -> Option<InboundEvent> {
        let event = match self {
            InboundKind::DeviceInfo | InboundKind::DeviceAdded => {
                let (id, device_type, port) = (str_arg(args, 0)?, str_arg(args, 1)?, int_arg(args, 2)?);
                let record = match DeviceRecord::new(id, device_type, port) {
                    Ok(record) => record,
                    Err(e) => {
                        warn!("Ignoring device report: {}", e);
                        return None;
                    }
                };
                if self == InboundKind::DeviceInfo {
                    InboundEvent::DeviceInfo(record)
                } else {
                    InboundEvent::DeviceAdded(record)
                }
            }
            InboundKind::DeviceRemoved => InboundEvent::DeviceRemoved {
                id: str_arg(args, 0)?.to_string(),
            },
            InboundKind::EncoderDelta => InboundEvent::EncoderDelta {
                encoder: int_arg(args, 0)?,
                delta: int_arg(args, 1)?,
            },
            InboundKind::EncoderKey => InboundEvent::EncoderKey {
                encoder: int_arg(args, 0)?,
                pressed: int_arg(args, 1)? == 1,
            },
            InboundKind::GridKey => InboundEvent::GridKey {
                x: int_arg(args, 0)?,
                y: int_arg(args, 1)?,
                pressed: int_arg(args, 2)? == 1,
            },
            InboundKind::Tilt => InboundEvent::Tilt {
                sensor: int_arg(args, 0)?,
                x: int_arg(args, 1)?,
                y: int_arg(args, 2)?,
                z: int_arg(args, 3)?,
            },
        };
        Some(event)
    }
}

fn int_arg(args: &[OscType], index: usize) -> Option<i32> {
    match args.get(index)? {
        OscType::Int(v) => Some(*v),
        _ => None,
    }
}

fn str_arg(args: &[OscType], index: usize) -> Option<&str> {
    match args.get(index)? {
        OscType::String(s) => Some(s.as_str()),
        _ => None,
    }
}

/// Parsed inbound message from serialosc or the bound device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Reply to a list request
    DeviceInfo(DeviceRecord),
    /// A device became available
    DeviceAdded(DeviceRecord),
    /// A device went away
    DeviceRemoved { id: String },
    /// Relative encoder turn
    EncoderDelta { encoder: i32, delta: i32 },
    /// Encoder pushbutton edge
    EncoderKey { encoder: i32, pressed: bool },
    /// Grid key edge
    GridKey { x: i32, y: i32, pressed: bool },
    /// Tilt sensor sample
    Tilt { sensor: i32, x: i32, y: i32, z: i32 },
}

impl fmt::Display for InboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InboundEvent::DeviceInfo(r) => {
                write!(f, "device detected: {} type: {} port: {}", r.id, r.device_type, r.port)
            }
            InboundEvent::DeviceAdded(r) => {
                write!(f, "device added: {} type: {} port: {}", r.id, r.device_type, r.port)
            }
            InboundEvent::DeviceRemoved { id } => write!(f, "device removed: {}", id),
            InboundEvent::EncoderDelta { encoder, delta } => {
                write!(f, "encoder {} delta: {}", encoder, delta)
            }
            InboundEvent::EncoderKey { encoder, pressed } => {
                write!(f, "encoder {} state: {}", encoder, u8::from(*pressed))
            }
            InboundEvent::GridKey { x, y, pressed } => {
                write!(f, "key ({},{}) {}", x, y, if *pressed { "down" } else { "up" })
            }
            InboundEvent::Tilt { sensor, x, y, z } => {
                write!(f, "tilt {} ({},{},{})", sensor, x, y, z)
            }
        }
    }
}

/// Table of address patterns the listener accepts
///
/// Patterns are matched literally; there is no wildcard routing.
#[derive(Debug, Clone, Default)]
pub struct AddressSpace {
    methods: HashMap<String, InboundKind>,
}

impl AddressSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address space for one grid and/or one arc bound to `prefix`
    pub fn serialosc(prefix: &str) -> Self {
        let mut space = Self::new();

        space.register(address::DEVICE, InboundKind::DeviceInfo);
        space.register(address::ADD, InboundKind::DeviceAdded);
        space.register(address::REMOVE, InboundKind::DeviceRemoved);

        space.register(format!("{}/enc/delta", prefix), InboundKind::EncoderDelta);
        space.register(format!("{}/enc/key", prefix), InboundKind::EncoderKey);

        space.register(format!("{}/grid/key", prefix), InboundKind::GridKey);
        space.register(format!("{}/tilt", prefix), InboundKind::Tilt);

        space
    }

    pub fn register(&mut self, pattern: impl Into<String>, kind: InboundKind) {
        self.methods.insert(pattern.into(), kind);
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Match a message against the registered patterns and parse its arguments
    ///
    /// Returns `None` for unregistered addresses and for argument lists that
    /// do not match the pattern's type tags.
    pub fn dispatch(&self, message: &OscMessage) -> Option<InboundEvent> {
        let Some(kind) = self.methods.get(&message.addr) else {
            debug!("No method registered for {}", message.addr);
            return None;
        };

        let event = kind.parse(&message.args);
        if event.is_none() {
            warn!(
                "Malformed {} message (expected {}): {:?}",
                message.addr,
                kind.type_tags(),
                message.args
            );
        }
        event
    }
}

/// Outbound LED/sensor command addressed under the session prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    GridLedAll { level: i32 },
    GridLedSet { x: i32, y: i32, level: i32 },
    TiltSet { sensor: i32, enabled: bool },
    RingAll { ring: i32, level: i32 },
    RingSet { ring: i32, pos: i32, level: i32 },
    RingRange { ring: i32, from: i32, to: i32, level: i32 },
}

impl DeviceCommand {
    pub fn to_message(&self, prefix: &str) -> OscMessage {
        let (path, args): (&str, Vec<i32>) = match *self {
            DeviceCommand::GridLedAll { level } => ("/grid/led/level/all", vec![level]),
            DeviceCommand::GridLedSet { x, y, level } => ("/grid/led/level/set", vec![x, y, level]),
            DeviceCommand::TiltSet { sensor, enabled } => {
                ("/tilt/set", vec![sensor, i32::from(enabled)])
            }
            DeviceCommand::RingAll { ring, level } => ("/ring/all", vec![ring, level]),
            DeviceCommand::RingSet { ring, pos, level } => ("/ring/set", vec![ring, pos, level]),
            DeviceCommand::RingRange { ring, from, to, level } => {
                ("/ring/range", vec![ring, from, to, level])
            }
        };

        OscMessage {
            addr: format!("{}{}", prefix, path),
            args: args.into_iter().map(OscType::Int).collect(),
        }
    }
}

/// `/serialosc/list host port`
pub fn list_request(host: &str, port: u16) -> OscMessage {
    host_port_message(address::LIST, host, port)
}

/// `/serialosc/notify host port`
pub fn notify_request(host: &str, port: u16) -> OscMessage {
    host_port_message(address::NOTIFY, host, port)
}

fn host_port_message(addr: &str, host: &str, port: u16) -> OscMessage {
    OscMessage {
        addr: addr.to_string(),
        args: vec![OscType::String(host.to_string()), OscType::Int(i32::from(port))],
    }
}

/// The three handshake announcements, in the order the device expects them
pub fn handshake(host: &str, port: u16, prefix: &str) -> [OscMessage; 3] {
    [
        OscMessage {
            addr: address::SYS_HOST.to_string(),
            args: vec![OscType::String(host.to_string())],
        },
        OscMessage {
            addr: address::SYS_PORT.to_string(),
            args: vec![OscType::Int(i32::from(port))],
        },
        OscMessage {
            addr: address::SYS_PREFIX.to_string(),
            args: vec![OscType::String(prefix.to_string())],
        },
    ]
}
