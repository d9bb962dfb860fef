// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport layer.
//!
//! The core only needs an addressable pub/sub bus:
//! - broadcast and unicast send
//! - sender address and wall-clock send stamp on every delivery
//! - handlers invoked on whatever thread the transport receives on
//!
//! Two adapters are provided: [`memory::MemoryBus`] (in-process) and
//! `udp::UdpTransport` (feature `udp`).

use crate::error::Result;
use crate::protocol::{Annotations, Envelope, LinkMessage};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

pub mod memory;
#[cfg(feature = "udp")]
pub mod udp;

/// Opaque transport-assigned endpoint identifier.
///
/// Comparable and hashable; intentionally not ordered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointAddress(AddressRepr);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum AddressRepr {
    Local(u64),
    Socket(SocketAddr),
}

impl EndpointAddress {
    pub(crate) fn local(id: u64) -> Self {
        Self(AddressRepr::Local(id))
    }

    pub(crate) fn socket(addr: SocketAddr) -> Self {
        Self(AddressRepr::Socket(addr))
    }

    pub(crate) fn local_id(&self) -> Option<u64> {
        match self.0 {
            AddressRepr::Local(id) => Some(id),
            AddressRepr::Socket(_) => None,
        }
    }

    /// Network address, for socket-based transports.
    pub fn as_socket_addr(&self) -> Option<SocketAddr> {
        match self.0 {
            AddressRepr::Socket(addr) => Some(addr),
            AddressRepr::Local(_) => None,
        }
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            AddressRepr::Local(id) => write!(f, "local:{}", id),
            AddressRepr::Socket(addr) => write!(f, "udp:{}", addr),
        }
    }
}

impl From<SocketAddr> for EndpointAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::socket(addr)
    }
}

/// Whether an endpoint receives broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Receives broadcast traffic (providers answering pings).
    Discoverable,
    /// Unicast only.
    Private,
}

/// A received message with its transport metadata.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub sender: EndpointAddress,
    /// Sender wall-clock seconds at send time
    pub sent_at: f64,
    pub annotations: Annotations,
    pub message: LinkMessage,
}

impl Delivery {
    pub fn from_envelope(envelope: Envelope, sender: EndpointAddress) -> Self {
        Self {
            sender,
            sent_at: envelope.sent_at,
            annotations: envelope.annotations,
            message: envelope.message,
        }
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

/// Receives deliveries, possibly on an arbitrary thread.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, delivery: Delivery);
}

impl<F> MessageHandler for F
where
    F: Fn(Delivery) + Send + Sync,
{
    fn handle(&self, delivery: Delivery) {
        self(delivery);
    }
}

/// An open endpoint on the bus.
pub trait Endpoint: Send + Sync {
    fn address(&self) -> EndpointAddress;

    /// Unicast `message` to `to`. The transport stamps the send time.
    fn send(&self, to: &EndpointAddress, message: LinkMessage, annotations: Annotations)
        -> Result<()>;

    /// Send `message` to every discoverable endpoint.
    fn broadcast(&self, message: LinkMessage, annotations: Annotations) -> Result<()>;

    /// Stop delivering to this endpoint's handler and release its resources.
    ///
    /// Idempotent. A delivery already handed to the handler may still
    /// complete, so owners disable their handler before closing.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Factory for endpoints.
pub trait Transport: Send + Sync {
    fn open(&self, kind: EndpointKind, handler: Arc<dyn MessageHandler>)
        -> Result<Arc<dyn Endpoint>>;
}
