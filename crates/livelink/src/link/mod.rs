// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Consumer side.
//!
//! A [`LinkContext`] owns the services shared by every link (discovery,
//! heartbeats, clock, roles). Each link is a [`ConnectionMonitor`] with its
//! own private endpoint:
//!
//! ```text
//!   discover("RigA")          connect_to(addr)
//!         |                          |
//!  AwaitingDiscovery                 |
//!         | Pong matched             |
//!         v                          v
//!     Connecting --- first traffic ---> Active
//!                                    |    ^
//!                  heartbeat timeout |    | traffic
//!                                    v    |
//!                                  SoftInvalid
//!                                    |
//!                 dead-source timeout|
//!                                    v
//!                                  Dead (endpoint closed, owner notified)
//! ```

mod context;
mod heartbeat;
mod monitor;
mod state;
mod subject;

pub use context::{LinkContext, LinkContextBuilder};
pub use heartbeat::HeartbeatEmitter;
pub use monitor::{ConnectionMonitor, RemovalCallback};
pub use state::LinkState;

use crate::buffer::EvaluationMode;
use crate::config::LinkConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Process-unique link identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// Per-link buffering and evaluation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferSettings {
    /// Samples kept per subject (clamped by the global policy)
    pub max_size: usize,
    pub evaluation_mode: EvaluationMode,
    /// Seconds subtracted from "now" when evaluating
    pub evaluation_offset: f64,
    pub stats_enabled: bool,
}

impl BufferSettings {
    pub fn from_config(config: &LinkConfig) -> Self {
        Self {
            max_size: config.buffer_policy.clamp(config.default_buffer_size),
            evaluation_mode: EvaluationMode::default(),
            evaluation_offset: 0.0,
            stats_enabled: config.stats_enabled,
        }
    }
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self::from_config(&LinkConfig::default())
    }
}

/// User-facing settings of one link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSettings {
    /// Disabled links stay connected but drop inbound frames
    pub enabled: bool,
    /// Named group for bulk operations
    pub group: Option<String>,
    pub buffer: BufferSettings,
}

impl LinkSettings {
    pub fn from_config(config: &LinkConfig) -> Self {
        Self {
            enabled: true,
            group: None,
            buffer: BufferSettings::from_config(config),
        }
    }
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self::from_config(&LinkConfig::default())
    }
}
