// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Clocks and time types.
//!
//! Two local time domains are tracked:
//! - **platform time**: a monotonic per-process clock in seconds
//! - **timecode**: an optional externally driven frame clock
//!
//! Wall-clock seconds are only used for transport send stamps, which is the
//! one value two machines can compare directly (modulo NTP error).

use crate::buffer::EvaluationMode;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Source of local time.
pub trait Clock: Send + Sync {
    /// Monotonic platform time in seconds.
    fn platform_seconds(&self) -> f64;

    /// Wall-clock time in seconds since the UNIX epoch.
    fn wall_seconds(&self) -> f64;

    /// Current local timecode, when a timecode source is attached.
    fn timecode(&self) -> Option<QualifiedFrameTime> {
        None
    }
}

/// Clock backed by `Instant` and `SystemTime`.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn platform_seconds(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn wall_seconds(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

#[derive(Debug)]
struct ManualState {
    platform: f64,
    wall: f64,
    timecode: Option<QualifiedFrameTime>,
}

/// Manually driven clock for simulations and tests.
///
/// Clones share the same underlying time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    /// Create a clock at the given platform and wall times.
    pub fn new(platform: f64, wall: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                platform,
                wall,
                timecode: None,
            })),
        }
    }

    /// Advance platform and wall time together.
    pub fn advance(&self, seconds: f64) {
        let mut state = self.state.lock();
        state.platform += seconds;
        state.wall += seconds;
        if let Some(tc) = state.timecode.as_mut() {
            *tc = QualifiedFrameTime::from_seconds(tc.as_seconds() + seconds, tc.rate);
        }
    }

    /// Set the platform time.
    pub fn set_platform(&self, seconds: f64) {
        self.state.lock().platform = seconds;
    }

    /// Set the wall-clock time.
    pub fn set_wall(&self, seconds: f64) {
        self.state.lock().wall = seconds;
    }

    /// Attach (or detach) a timecode source.
    pub fn set_timecode(&self, timecode: Option<QualifiedFrameTime>) {
        self.state.lock().timecode = timecode;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl Clock for ManualClock {
    fn platform_seconds(&self) -> f64 {
        self.state.lock().platform
    }

    fn wall_seconds(&self) -> f64 {
        self.state.lock().wall
    }

    fn timecode(&self) -> Option<QualifiedFrameTime> {
        self.state.lock().timecode
    }
}

/// Frame rate expressed as a rational number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl FrameRate {
    pub const FPS_24: FrameRate = FrameRate::new(24, 1);
    pub const FPS_30: FrameRate = FrameRate::new(30, 1);
    pub const FPS_60: FrameRate = FrameRate::new(60, 1);
    pub const NTSC_30: FrameRate = FrameRate::new(30000, 1001);

    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// A rate is usable when both terms are non-zero.
    pub fn is_valid(&self) -> bool {
        self.numerator > 0 && self.denominator > 0
    }

    /// Frames per second as a float.
    pub fn as_decimal(&self) -> f64 {
        f64::from(self.numerator) / f64::from(self.denominator)
    }

    /// Duration of one frame in seconds.
    pub fn frame_seconds(&self) -> f64 {
        f64::from(self.denominator) / f64::from(self.numerator)
    }
}

/// A frame number (with sub-frame fraction) qualified by its rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualifiedFrameTime {
    pub frame: f64,
    pub rate: FrameRate,
}

impl QualifiedFrameTime {
    pub fn new(frame: f64, rate: FrameRate) -> Self {
        Self { frame, rate }
    }

    /// Convert seconds to a frame time at `rate`.
    pub fn from_seconds(seconds: f64, rate: FrameRate) -> Self {
        Self {
            frame: seconds * rate.as_decimal(),
            rate,
        }
    }

    pub fn as_seconds(&self) -> f64 {
        self.frame * self.rate.frame_seconds()
    }
}

/// Time axis a buffered sample is indexed by.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleTime {
    pub platform_seconds: f64,
    #[serde(default)]
    pub timecode: Option<QualifiedFrameTime>,
}

impl SampleTime {
    pub fn from_platform(platform_seconds: f64) -> Self {
        Self {
            platform_seconds,
            timecode: None,
        }
    }

    pub fn with_timecode(mut self, timecode: QualifiedFrameTime) -> Self {
        self.timecode = Some(timecode);
        self
    }

    /// Seconds on the axis selected by `mode`.
    ///
    /// `EvaluationMode::None` orders by platform time.
    pub fn seconds(&self, mode: EvaluationMode) -> Option<f64> {
        match mode {
            EvaluationMode::None | EvaluationMode::PlatformTime => Some(self.platform_seconds),
            EvaluationMode::Timecode => self.timecode.map(|tc| tc.as_seconds()),
        }
    }
}
