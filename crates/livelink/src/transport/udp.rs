// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP transport.
//!
//! Each endpoint owns a unicast socket on an ephemeral port; all sends leave
//! from it, so its address is the endpoint's identity. Discoverable endpoints
//! also bind a listener on the well-known discovery port for broadcast pings.
//! Every socket gets a receive thread with a short read timeout so `close()`
//! returns promptly.
//!
//! Messages travel as one JSON-encoded [`Envelope`] per datagram.

use super::{Delivery, Endpoint, EndpointAddress, EndpointKind, MessageHandler, Transport};
use crate::error::{Error, Result};
use crate::protocol::{Annotations, Envelope, LinkMessage};
use crate::time::{Clock, SystemClock};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Default well-known discovery port.
pub const DEFAULT_DISCOVERY_PORT: u16 = 7425;

/// Largest datagram we send or expect to receive.
pub const DEFAULT_MAX_DATAGRAM: usize = 65_000;

const RECV_TIMEOUT: Duration = Duration::from_millis(50);

/// UDP adapter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UdpTransportConfig {
    /// Local interface to bind
    #[serde(default = "default_bind_ip")]
    pub bind_ip: Ipv4Addr,

    /// Port discoverable endpoints listen on for pings
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,

    /// Send broadcasts to `broadcast_addr:discovery_port`
    #[serde(default = "default_true")]
    pub broadcast: bool,

    #[serde(default = "default_broadcast_addr")]
    pub broadcast_addr: Ipv4Addr,

    /// Extra unicast targets for broadcasts (networks without broadcast)
    #[serde(default)]
    pub peers: Vec<SocketAddr>,

    #[serde(default = "default_max_datagram")]
    pub max_datagram: usize,

    /// Allow several discoverable endpoints on one host
    #[serde(default = "default_true")]
    pub reuse_port: bool,

    /// SO_RCVBUF socket option (0 = OS default)
    #[serde(default = "default_recv_buffer_size")]
    pub recv_buffer_size: usize,
}

fn default_bind_ip() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

fn default_discovery_port() -> u16 {
    DEFAULT_DISCOVERY_PORT
}

fn default_broadcast_addr() -> Ipv4Addr {
    Ipv4Addr::BROADCAST
}

fn default_max_datagram() -> usize {
    DEFAULT_MAX_DATAGRAM
}

fn default_recv_buffer_size() -> usize {
    1024 * 1024 // replays arrive as a burst of datagrams
}

fn default_true() -> bool {
    true
}

impl Default for UdpTransportConfig {
    fn default() -> Self {
        Self {
            bind_ip: default_bind_ip(),
            discovery_port: default_discovery_port(),
            broadcast: true,
            broadcast_addr: default_broadcast_addr(),
            peers: Vec::new(),
            max_datagram: default_max_datagram(),
            reuse_port: true,
            recv_buffer_size: default_recv_buffer_size(),
        }
    }
}

impl UdpTransportConfig {
    /// Loopback-only config with explicit peers, for tests and local setups.
    pub fn loopback(discovery_port: u16) -> Self {
        Self {
            bind_ip: Ipv4Addr::LOCALHOST,
            discovery_port,
            broadcast: false,
            peers: vec![SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::LOCALHOST,
                discovery_port,
            ))],
            ..Default::default()
        }
    }

    fn broadcast_targets(&self) -> Vec<SocketAddr> {
        let mut targets = Vec::with_capacity(self.peers.len() + 1);
        if self.broadcast {
            targets.push(SocketAddr::V4(SocketAddrV4::new(
                self.broadcast_addr,
                self.discovery_port,
            )));
        }
        targets.extend(self.peers.iter().copied());
        targets
    }
}

/// UDP broadcast/unicast transport.
pub struct UdpTransport {
    config: UdpTransportConfig,
    clock: Arc<dyn Clock>,
}

impl UdpTransport {
    pub fn new(config: UdpTransportConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Use `clock` for send stamps.
    pub fn with_clock(config: UdpTransportConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &UdpTransportConfig {
        &self.config
    }
}

impl Transport for UdpTransport {
    fn open(
        &self,
        kind: EndpointKind,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Arc<dyn Endpoint>> {
        let recv_buffer = self.config.recv_buffer_size;
        let unicast = bind_socket(SocketAddrV4::new(self.config.bind_ip, 0), false, recv_buffer)
            .map_err(|e| Error::BindFailed(format!("unicast socket: {}", e)))?;
        unicast.set_broadcast(true)?;
        let local = unicast.local_addr()?;

        let listener = match kind {
            EndpointKind::Discoverable => {
                let addr = SocketAddrV4::new(self.config.bind_ip, self.config.discovery_port);
                let socket = bind_socket(addr, self.config.reuse_port, recv_buffer).map_err(|e| {
                    Error::BindFailed(format!("discovery listener {}: {}", addr, e))
                })?;
                Some(socket)
            }
            EndpointKind::Private => None,
        };

        let endpoint = Arc::new(UdpEndpoint {
            socket: unicast.try_clone()?,
            local,
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
            running: Arc::new(AtomicBool::new(true)),
            threads: Mutex::new(Vec::with_capacity(2)),
        });

        // On error the endpoint drops here and stops any receiver already spawned.
        endpoint.spawn_receiver(unicast, Arc::clone(&handler))?;
        if let Some(listener) = listener {
            endpoint.spawn_receiver(listener, handler)?;
        }

        log::debug!("[udp] opened {} ({:?})", local, kind);
        Ok(endpoint)
    }
}

fn bind_socket(addr: SocketAddrV4, reuse_port: bool, recv_buffer: usize) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    if recv_buffer > 0 {
        // The kernel may cap the request; keep whatever it grants.
        if let Err(e) = socket.set_recv_buffer_size(recv_buffer) {
            log::debug!("[udp] SO_RCVBUF {} rejected: {}", recv_buffer, e);
        }
    }
    #[cfg(any(target_os = "linux", target_os = "macos", target_os = "freebsd"))]
    if reuse_port {
        socket.set_reuse_port(true)?;
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "freebsd")))]
    let _ = reuse_port;
    socket.bind(&SocketAddr::V4(addr).into())?;

    let socket: UdpSocket = socket.into();
    socket.set_read_timeout(Some(RECV_TIMEOUT))?;
    Ok(socket)
}

fn recv_loop(
    socket: UdpSocket,
    handler: Arc<dyn MessageHandler>,
    running: Arc<AtomicBool>,
    max_datagram: usize,
) {
    let mut buf = vec![0u8; max_datagram];
    while running.load(Ordering::Relaxed) {
        match socket.recv_from(&mut buf) {
            Ok((len, src)) => match Envelope::decode(&buf[..len]) {
                Ok(envelope) => {
                    if !running.load(Ordering::Relaxed) {
                        break;
                    }
                    let sender = EndpointAddress::socket(src);
                    handler.handle(Delivery::from_envelope(envelope, sender));
                }
                Err(e) => log::debug!("[udp] dropping malformed datagram from {}: {}", src, e),
            },
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) => {
                log::debug!("[udp] recv error: {}", e);
                thread::sleep(RECV_TIMEOUT);
            }
        }
    }
}

struct UdpEndpoint {
    socket: UdpSocket,
    local: SocketAddr,
    config: UdpTransportConfig,
    clock: Arc<dyn Clock>,
    running: Arc<AtomicBool>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl UdpEndpoint {
    fn spawn_receiver(&self, socket: UdpSocket, handler: Arc<dyn MessageHandler>) -> Result<()> {
        let label = socket
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "?".into());
        let running = Arc::clone(&self.running);
        let max_datagram = self.config.max_datagram;
        let handle = thread::Builder::new()
            .name(format!("livelink-udp-{}", label))
            .spawn(move || recv_loop(socket, handler, running, max_datagram))?;
        self.threads.lock().push(handle);
        Ok(())
    }

    fn encode(&self, message: LinkMessage, annotations: Annotations) -> Result<Vec<u8>> {
        let envelope = Envelope {
            sent_at: self.clock.wall_seconds(),
            annotations,
            message,
        };
        let bytes = envelope.encode()?;
        if bytes.len() > self.config.max_datagram {
            return Err(Error::MessageTooLarge(bytes.len()));
        }
        Ok(bytes)
    }
}

impl Endpoint for UdpEndpoint {
    fn address(&self) -> EndpointAddress {
        EndpointAddress::socket(self.local)
    }

    fn send(
        &self,
        to: &EndpointAddress,
        message: LinkMessage,
        annotations: Annotations,
    ) -> Result<()> {
        if self.is_closed() {
            return Err(Error::EndpointClosed);
        }
        let target = to
            .as_socket_addr()
            .ok_or_else(|| Error::SendFailed(format!("{} is not a socket address", to)))?;
        let bytes = self.encode(message, annotations)?;
        self.socket
            .send_to(&bytes, target)
            .map_err(|e| Error::SendFailed(format!("{}: {}", target, e)))?;
        Ok(())
    }

    fn broadcast(&self, message: LinkMessage, annotations: Annotations) -> Result<()> {
        if self.is_closed() {
            return Err(Error::EndpointClosed);
        }
        let bytes = self.encode(message, annotations)?;
        let targets = self.config.broadcast_targets();

        let mut last_err = None;
        let mut delivered = 0usize;
        for target in &targets {
            match self.socket.send_to(&bytes, target) {
                Ok(_) => delivered += 1,
                Err(e) => {
                    log::debug!("[udp] broadcast to {} failed: {}", target, e);
                    last_err = Some(e);
                }
            }
        }
        match (delivered, last_err) {
            (0, Some(e)) => Err(Error::SendFailed(format!("broadcast: {}", e))),
            _ => Ok(()),
        }
    }

    fn close(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let current = thread::current().id();
        for handle in self.threads.lock().drain(..) {
            // close() may run on one of our own receive threads
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
        log::debug!("[udp] closed {}", self.local);
    }

    fn is_closed(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }
}

impl Drop for UdpEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}
