// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Provider side.
//!
//! A [`ProviderRegistry`] owns one discoverable endpoint and:
//! - answers Ping with Pong
//! - admits consumers on Connect and replays cached subjects to them
//! - refreshes and echoes Heartbeats
//! - fans subject updates out to every subscribed consumer
//! - evicts consumers silent for longer than the validity window
//!
//! Per consumer address: *Unknown* -> (Connect) *Registered* -> (timeout)
//! removed.

mod cache;
mod registry;
mod roster;

pub use registry::{ProviderInfo, ProviderRegistry};
pub use roster::{ConnectionRecord, Roster};

/// Notifications for the provider application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// The roster gained or lost consumers.
    ConnectionsChanged { count: usize },
}
