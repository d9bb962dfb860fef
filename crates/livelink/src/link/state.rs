// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use std::fmt;

/// Consumer-side link lifecycle.
///
/// ```text
/// AwaitingDiscovery -> Connecting -> Active <-> SoftInvalid -> Dead
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    /// No provider address bound yet.
    AwaitingDiscovery,
    /// Connect sent, nothing heard back yet.
    Connecting,
    /// Traffic seen within the heartbeat timeout.
    Active,
    /// Silent for at least the heartbeat timeout; data retained.
    SoftInvalid,
    /// Silent for the dead-source timeout; torn down. Terminal.
    Dead,
}

impl LinkState {
    /// Human-readable status line.
    pub fn status_text(&self) -> &'static str {
        match self {
            LinkState::AwaitingDiscovery => "Waiting for provider",
            LinkState::Connecting => "Connecting",
            LinkState::Active => "Active",
            LinkState::SoftInvalid => "Not responding",
            LinkState::Dead => "Dead",
        }
    }

    pub fn is_bound(&self) -> bool {
        !matches!(self, LinkState::AwaitingDiscovery | LinkState::Dead)
    }

    pub fn is_terminal(&self) -> bool {
        *self == LinkState::Dead
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status_text())
    }
}
