// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded time-ordered sample buffers.
//!
//! Each consumer-side subject owns one [`SampleBuffer`]. Samples are kept
//! newest first; the buffer never grows past its configured maximum and
//! evicts the oldest sample instead, counting a frame drop.

mod sample_buffer;
mod stats;

pub use sample_buffer::{Sample, SampleBuffer};
pub use stats::{BufferStats, CachedState};

use serde::{Deserialize, Serialize};

/// Which timestamp field drives ordering and evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// No time alignment: always evaluate the newest sample.
    None,
    /// Local platform time.
    #[default]
    PlatformTime,
    /// Local timecode (requires a timecode source).
    Timecode,
}

/// Global window every buffer size is clamped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferPolicy {
    #[serde(default = "default_min_allowed")]
    pub min_allowed: usize,
    #[serde(default = "default_max_allowed")]
    pub max_allowed: usize,
}

fn default_min_allowed() -> usize {
    1
}

fn default_max_allowed() -> usize {
    1000
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self {
            min_allowed: default_min_allowed(),
            max_allowed: default_max_allowed(),
        }
    }
}

impl BufferPolicy {
    pub fn new(min_allowed: usize, max_allowed: usize) -> Self {
        Self {
            min_allowed,
            max_allowed,
        }
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.min_allowed == 0 {
            return Err("buffer_policy.min_allowed must be >= 1");
        }
        if self.min_allowed > self.max_allowed {
            return Err("buffer_policy.min_allowed must not exceed max_allowed");
        }
        Ok(())
    }

    /// Clamp `size` into `[min_allowed, max_allowed]`.
    ///
    /// Never panics, even for an inverted policy (max wins).
    pub fn clamp(&self, size: usize) -> usize {
        size.max(self.min_allowed).min(self.max_allowed)
    }
}
