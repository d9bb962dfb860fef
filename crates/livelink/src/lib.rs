// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # livelink - live sample links over an unreliable pub/sub transport
//!
//! Discovers providers publishing live sampled data (motion-capture subjects,
//! cameras, lights), keeps consumer links alive with heartbeats, and aligns
//! the provider's timestamps with the consumer's clocks.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use livelink::{LinkCollection, LinkConfig, LinkContext, MemoryBus};
//! use std::sync::Arc;
//!
//! # fn main() -> livelink::Result<()> {
//! let bus = MemoryBus::new();
//! let ctx = LinkContext::builder(Arc::new(bus)).config(LinkConfig::default()).build()?;
//! ctx.start()?;
//!
//! let links = LinkCollection::new();
//! links.add(ctx.discover_link("RigA")?);
//!
//! loop {
//!     links.tick();
//!     // ... read subjects through `links` or an `Aggregator` ...
//! #   break;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                          Aggregator                                 |
//! |      links / named groups, bulk settings, tri-state reads           |
//! +---------------------------------------------------------------------+
//! |   LinkCollection -> ConnectionMonitor (one per link)                |
//! |   state machine | ClockSynchronizer | SampleBuffer per subject      |
//! +---------------------------------+-----------------------------------+
//! |  DiscoveryBroadcaster (Ping)    |  ProviderRegistry (Pong, roster,  |
//! |  HeartbeatEmitter               |  replay, fan-out)                 |
//! +---------------------------------+-----------------------------------+
//! |           Transport: MemoryBus | UdpTransport                       |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`transport`] - endpoint trait and adapters
//! - [`discovery`] - broadcast ping / unicast pong
//! - [`provider`] - provider-side roster and subject cache
//! - [`link`] - consumer-side connection monitor
//! - [`clock_sync`] - one-shot and ramped clock offsets
//! - [`buffer`] - bounded sample buffer and statistics
//! - [`aggregator`] - link collection and group operations

/// Link aggregation and bulk configuration.
pub mod aggregator;
/// Bounded time-ordered sample buffers.
pub mod buffer;
/// Clock offset estimation between two machines.
pub mod clock_sync;
/// Runtime configuration (timeouts, intervals, buffer policy).
pub mod config;
/// Broadcast discovery of providers.
pub mod discovery;
mod error;
/// Consumer-side link lifecycle.
pub mod link;
/// Log helpers.
pub mod logging;
/// Wire messages, payloads and roles.
pub mod protocol;
/// Provider-side registry.
pub mod provider;
/// Clocks and time types.
pub mod time;
/// Pub/sub transport abstraction and adapters.
pub mod transport;

pub use aggregator::{Aggregator, CalibrationOutcome, GroupEnabled, LinkCollection};
pub use buffer::{BufferPolicy, BufferStats, EvaluationMode, Sample, SampleBuffer};
pub use clock_sync::{ClockSynchronizer, RampedOffset};
pub use config::{ConfigError, LinkConfig};
pub use discovery::{DiscoveryBroadcaster, DiscoveryInterest, ProviderDescriptor};
pub use error::{Error, Result};
pub use link::{
    BufferSettings, ConnectionMonitor, HeartbeatEmitter, LinkContext, LinkId, LinkSettings,
    LinkState,
};
pub use protocol::{
    FrameData, LinkMessage, RoleRegistry, RoleSchema, StaticData, SubjectKey, PROTOCOL_VERSION,
};
pub use provider::{ProviderEvent, ProviderInfo, ProviderRegistry};
pub use time::{Clock, FrameRate, ManualClock, QualifiedFrameTime, SampleTime, SystemClock};
#[cfg(feature = "udp")]
pub use transport::udp::{UdpTransport, UdpTransportConfig};
pub use transport::{
    memory::MemoryBus, Delivery, Endpoint, EndpointAddress, EndpointKind, MessageHandler,
    Transport,
};
