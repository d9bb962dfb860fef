// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Buffer statistics.

use serde::Serialize;

/// Monotonic buffer counters.
///
/// - `underflow`: evaluation time fell before the oldest buffered sample
/// - `overflow`: evaluation time fell after the newest buffered sample
/// - `frame_drop`: samples evicted because the buffer was full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    pub underflow: u64,
    pub overflow: u64,
    pub frame_drop: u64,
}

impl BufferStats {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_clean(&self) -> bool {
        self.underflow == 0 && self.overflow == 0 && self.frame_drop == 0
    }
}

/// Sample timestamps captured at one evaluation point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachedState {
    pub evaluation_time: f64,
    /// Sample times, newest first
    pub sample_times: Vec<f64>,
    /// `newest - evaluation_time`, when stats are enabled and samples exist
    pub distance_to_newest: Option<f64>,
    /// `evaluation_time - oldest`, when stats are enabled and samples exist
    pub distance_to_oldest: Option<f64>,
}
