// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Clock offset estimation between a provider and a consumer.
//!
//! A one-shot offset is computed from the discovery Pong:
//!
//! ```text
//! latency = local_receive_wall - remote_send_wall
//! offset  = local_now - remote_creation_time - latency
//! ```
//!
//! After connect, every distinct upstream frame feeds an exponentially
//! smoothed ("ramped") estimate, one per time domain (platform, timecode).
//! Conversion uses `local = remote + offset` and `remote = local - offset`.

use crate::time::{QualifiedFrameTime, SampleTime};

/// One-shot machine-time offset in seconds.
pub fn one_shot_offset(
    local_now: f64,
    remote_creation_time: f64,
    local_receive_wall: f64,
    remote_send_wall: f64,
) -> f64 {
    let estimated_latency = local_receive_wall - remote_send_wall;
    local_now - remote_creation_time - estimated_latency
}

/// EWMA offset estimator.
///
/// The first observation initializes the estimate directly; later ones move
/// it by `alpha * (observed - offset)`.
#[derive(Debug, Clone)]
pub struct RampedOffset {
    offset: f64,
    alpha: f64,
    samples: u64,
}

impl RampedOffset {
    /// Create an estimator. `alpha` is clamped into `(0, 1]`.
    pub fn new(alpha: f64) -> Self {
        let alpha = if alpha.is_finite() && alpha > 0.0 {
            alpha.min(1.0)
        } else {
            1.0
        };
        Self {
            offset: 0.0,
            alpha,
            samples: 0,
        }
    }

    /// Feed one observed offset and return the updated estimate.
    pub fn observe(&mut self, observed: f64) -> f64 {
        self.samples += 1;
        if self.samples == 1 {
            self.offset = observed;
        } else {
            self.offset += self.alpha * (observed - self.offset);
        }
        self.offset
    }

    /// Current estimate, once initialized.
    pub fn offset(&self) -> Option<f64> {
        (self.samples > 0).then_some(self.offset)
    }

    pub fn is_initialized(&self) -> bool {
        self.samples > 0
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn reset(&mut self) {
        self.offset = 0.0;
        self.samples = 0;
    }
}

/// Per-link offset state for the platform and timecode domains.
#[derive(Debug, Clone)]
pub struct ClockSynchronizer {
    one_shot: Option<f64>,
    platform: RampedOffset,
    timecode: RampedOffset,
    /// Remote platform time of the last frame that fed the filters
    last_remote_platform: Option<f64>,
}

impl ClockSynchronizer {
    pub fn new(alpha: f64) -> Self {
        Self {
            one_shot: None,
            platform: RampedOffset::new(alpha),
            timecode: RampedOffset::new(alpha),
            last_remote_platform: None,
        }
    }

    /// Seed with the one-shot offset measured at discovery.
    pub fn seed(&mut self, offset: f64) {
        self.one_shot = Some(offset);
    }

    pub fn one_shot(&self) -> Option<f64> {
        self.one_shot
    }

    /// Offset applied to platform timestamps: ramped once initialized,
    /// otherwise the one-shot seed, otherwise zero.
    pub fn platform_offset(&self) -> f64 {
        self.platform
            .offset()
            .or(self.one_shot)
            .unwrap_or(0.0)
    }

    pub fn timecode_offset(&self) -> Option<f64> {
        self.timecode.offset()
    }

    pub fn platform_estimator(&self) -> &RampedOffset {
        &self.platform
    }

    pub fn timecode_estimator(&self) -> &RampedOffset {
        &self.timecode
    }

    /// Feed one upstream frame's remote time into the filters.
    ///
    /// `latency` is the transport-estimated one-way latency
    /// (`local_receive_wall - remote_send_wall`). Returns `false` when the
    /// frame was already observed (same remote platform time).
    pub fn observe(
        &mut self,
        remote: &SampleTime,
        local_platform: f64,
        local_timecode: Option<QualifiedFrameTime>,
        latency: f64,
    ) -> bool {
        if self.last_remote_platform == Some(remote.platform_seconds) {
            return false;
        }
        self.last_remote_platform = Some(remote.platform_seconds);

        self.platform
            .observe(local_platform - remote.platform_seconds - latency);

        if let (Some(remote_tc), Some(local_tc)) = (remote.timecode, local_timecode) {
            self.timecode
                .observe(local_tc.as_seconds() - remote_tc.as_seconds() - latency);
        }
        true
    }

    /// Remote platform seconds to local.
    pub fn to_local(&self, remote_seconds: f64) -> f64 {
        remote_seconds + self.platform_offset()
    }

    /// Local platform seconds to remote.
    pub fn to_remote(&self, local_seconds: f64) -> f64 {
        local_seconds - self.platform_offset()
    }

    /// Convert a remote sample time into the local domains.
    ///
    /// Timecode passes through unchanged until a timecode offset exists.
    pub fn convert(&self, remote: &SampleTime) -> SampleTime {
        let timecode = remote.timecode.map(|tc| match self.timecode.offset() {
            Some(offset) => QualifiedFrameTime::from_seconds(tc.as_seconds() + offset, tc.rate),
            None => tc,
        });
        SampleTime {
            platform_seconds: self.to_local(remote.platform_seconds),
            timecode,
        }
    }

    /// Forget every estimate, including the seed.
    pub fn reset(&mut self) {
        self.one_shot = None;
        self.platform.reset();
        self.timecode.reset();
        self.last_remote_platform = None;
    }
}

impl Default for ClockSynchronizer {
    fn default() -> Self {
        Self::new(0.1)
    }
}
