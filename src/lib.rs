//! serialosc-gw
//!
//! Discovery and connection-state management for monome serialosc devices.
//!
//! One init cycle creates every UDP endpoint up front: the discovery channel
//! to serialosc, the inbound listener and, when a device port is persisted,
//! the device channel. Changing the device port means persisting it and
//! running a new cycle; see [`connection::Effect`].

pub mod bridge;
pub mod cli;
pub mod config;
pub mod connection;
pub mod discovery;
pub mod endpoints;
pub mod error;
pub mod feedback;
pub mod osc;
pub mod session;
pub mod transport;

pub use bridge::Bridge;
pub use error::{BridgeError, Result};
