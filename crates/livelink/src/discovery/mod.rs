// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Provider discovery (consumer side).
//!
//! ```text
//!  consumer                                  provider(s)
//!     | --- Ping{request_id, version} (bcast) --> |
//!     | <-- Pong{name, machine, request_id, ...} - |   unicast
//! ```
//!
//! A Ping is broadcast once per interval while at least one
//! [`DiscoveryInterest`] is alive. Each new Ping starts a new cycle: the
//! result set is cleared and only Pongs carrying the new request id count.

mod broadcaster;

pub use broadcaster::{DiscoveryBroadcaster, DiscoveryInterest};

use crate::transport::EndpointAddress;

/// A provider that answered the current discovery cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderDescriptor {
    pub display_name: String,
    pub machine_name: String,
    pub address: EndpointAddress,
    /// One-shot offset mapping the provider's platform time onto ours (seconds)
    pub machine_time_offset: f64,
}
