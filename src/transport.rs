//! UDP/OSC transport
//!
//! The core only sees decoded `OscMessage`s going out through an [`OscSink`]
//! and parsed [`InboundEvent`]s coming in through a channel. `UdpTransport`
//! is the real implementation over tokio sockets and the `rosc` codec.

use rosc::{OscMessage, OscPacket};
use std::io;
use std::net::UdpSocket as StdUdpSocket;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::osc::{AddressSpace, InboundEvent};

/// Outgoing half of an endpoint
///
/// Sends are fire-and-forget: `Ok` means the datagram was handed to the OS.
pub trait OscSink: Send + Sync {
    fn send(&self, message: &OscMessage) -> io::Result<()>;
}

/// Creates endpoints; used by the registry during the initialization phase
pub trait Transport {
    /// Open an outbound channel to `host:port` from an ephemeral local port
    fn connect(&mut self, host: &str, port: u16) -> io::Result<Arc<dyn OscSink>>;

    /// Bind the inbound listener and start dispatching messages through `space`
    fn listen(&mut self, port: u16, space: AddressSpace) -> io::Result<()>;
}

/// tokio UDP transport forwarding parsed events into the dispatch queue
pub struct UdpTransport {
    events: mpsc::Sender<InboundEvent>,
    listeners: Vec<JoinHandle<()>>,
}

impl UdpTransport {
    pub fn new(events: mpsc::Sender<InboundEvent>) -> Self {
        Self {
            events,
            listeners: Vec::new(),
        }
    }

    /// Stop listener tasks and wait until their sockets are released
    pub async fn close(self) {
        for handle in self.listeners {
            handle.abort();
            let _ = handle.await;
        }
        debug!("UDP transport closed");
    }
}

impl Transport for UdpTransport {
    fn connect(&mut self, host: &str, port: u16) -> io::Result<Arc<dyn OscSink>> {
        let socket = StdUdpSocket::bind(("0.0.0.0", 0))?;
        socket.connect((host, port))?;
        socket.set_nonblocking(true)?;
        let local = socket.local_addr()?;

        let socket = UdpSocket::from_std(socket)?;
        debug!("Outbound UDP {} -> {}:{}", local, host, port);

        Ok(Arc::new(UdpSink { socket }))
    }

    fn listen(&mut self, port: u16, space: AddressSpace) -> io::Result<()> {
        let socket = StdUdpSocket::bind(("0.0.0.0", port))?;
        socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(socket)?;

        info!("Listening for OSC on UDP port {}", port);

        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            let mut buf = vec![0u8; rosc::decoder::MTU];
            loop {
                let (size, from) = match socket.recv_from(&mut buf).await {
                    Ok(received) => received,
                    Err(e) => {
                        // ICMP errors from earlier sends surface here on some platforms
                        debug!("Listener receive error: {}", e);
                        continue;
                    }
                };

                let packet = match rosc::decoder::decode_udp(&buf[..size]) {
                    Ok((_, packet)) => packet,
                    Err(e) => {
                        warn!("Undecodable OSC packet from {}: {:?}", from, e);
                        continue;
                    }
                };

                for message in flatten(packet) {
                    trace!("OSC in from {}: {} {:?}", from, message.addr, message.args);
                    if let Some(event) = space.dispatch(&message) {
                        if events.send(event).await.is_err() {
                            debug!("Dispatch queue closed, stopping listener");
                            return;
                        }
                    }
                }
            }
        });

        self.listeners.push(handle);
        Ok(())
    }
}

struct UdpSink {
    socket: UdpSocket,
}

impl OscSink for UdpSink {
    fn send(&self, message: &OscMessage) -> io::Result<()> {
        let bytes = rosc::encoder::encode(&OscPacket::Message(message.clone()))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{:?}", e)))?;
        self.socket.try_send(&bytes)?;
        Ok(())
    }
}

/// Messages of a packet in order, bundles flattened
fn flatten(packet: OscPacket) -> Vec<OscMessage> {
    match packet {
        OscPacket::Message(message) => vec![message],
        OscPacket::Bundle(bundle) => bundle.content.into_iter().flat_map(flatten).collect(),
    }
}
