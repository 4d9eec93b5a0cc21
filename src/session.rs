//! Device session
//!
//! Handshake and reset for the device-out channel. Everything is
//! fire-and-forget UDP: a failed send is logged and the session stays open,
//! the next discovery cycle is what corrects a stale device.

use rosc::OscMessage;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::discovery::ListenerAddress;
use crate::endpoints::OutboundChannel;
use crate::feedback::{ENCODER_COUNT, LEVEL_FULL, LEVEL_OFF};
use crate::osc::{self, DeviceCommand};

/// Device class the reset sequence is chosen for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    /// Reset both grid and arc state; the device ignores what it lacks
    #[default]
    Auto,
    Grid,
    Arc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoSession,
    Handshaking,
    Ready,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::NoSession => "no session",
            SessionState::Handshaking => "handshaking",
            SessionState::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Commands bringing a freshly connected device to a known LED state
pub fn reset_commands(class: DeviceClass) -> Vec<DeviceCommand> {
    let mut commands = Vec::new();

    if matches!(class, DeviceClass::Auto | DeviceClass::Grid) {
        commands.push(DeviceCommand::GridLedAll { level: LEVEL_OFF });
        commands.push(DeviceCommand::TiltSet { sensor: 0, enabled: false });
    }

    if matches!(class, DeviceClass::Auto | DeviceClass::Arc) {
        // Every ring dark except a marker at position 0
        for ring in 0..ENCODER_COUNT as i32 {
            commands.push(DeviceCommand::RingAll { ring, level: LEVEL_OFF });
            commands.push(DeviceCommand::RingSet { ring, pos: 0, level: LEVEL_FULL });
        }
    }

    commands
}

pub struct DeviceSession {
    channel: OutboundChannel,
    prefix: String,
    state: SessionState,
}

impl DeviceSession {
    /// Announce the listener to the device, then reset its LEDs
    pub fn open(
        channel: OutboundChannel,
        listener: &ListenerAddress,
        prefix: &str,
        class: DeviceClass,
    ) -> Self {
        let mut session = Self {
            channel,
            prefix: prefix.to_string(),
            state: SessionState::Handshaking,
        };

        info!(
            "Handshake with {} (prefix {})",
            session.channel.endpoint(),
            prefix
        );
        for message in osc::handshake(&listener.host, listener.port, prefix) {
            session.send_message(message);
        }

        session.send_all(reset_commands(class));

        session.state = SessionState::Ready;
        info!("Device session ready");
        session
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn port(&self) -> u16 {
        self.channel.endpoint().port
    }

    pub fn send(&self, command: DeviceCommand) {
        debug!("-> {:?}", command);
        self.send_message(command.to_message(&self.prefix));
    }

    pub fn send_all(&self, commands: impl IntoIterator<Item = DeviceCommand>) {
        for command in commands {
            self.send(command);
        }
    }

    fn send_message(&self, message: OscMessage) {
        if let Err(e) = self.channel.send(message) {
            warn!("Device send failed: {}", e);
        }
    }
}
