// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Consumer-side state of one subject.

use super::BufferSettings;
use crate::buffer::{BufferPolicy, Sample, SampleBuffer};
use crate::protocol::{FrameData, RoleSchema, StaticData};

#[derive(Debug)]
pub(crate) struct SubjectState {
    pub role: RoleSchema,
    pub static_data: StaticData,
    /// Most recent frame, already in local time
    pub latest: Option<FrameData>,
    pub buffer: SampleBuffer<FrameData>,
}

impl SubjectState {
    pub fn new(role: RoleSchema, static_data: StaticData, settings: &BufferSettings) -> Self {
        Self {
            role,
            static_data,
            latest: None,
            buffer: SampleBuffer::new(settings.max_size)
                .with_mode(settings.evaluation_mode)
                .with_stats(settings.stats_enabled),
        }
    }

    /// Store a frame whose time is already local.
    pub fn push(&mut self, frame: FrameData) {
        self.buffer.add(Sample::new(frame.time, frame.clone()));
        self.latest = Some(frame);
    }

    pub fn apply(&mut self, settings: &BufferSettings, policy: &BufferPolicy) {
        self.buffer.set_max_size(settings.max_size, policy);
        if self.buffer.mode() != settings.evaluation_mode {
            self.buffer.set_mode(settings.evaluation_mode);
        }
        self.buffer.set_stats_enabled(settings.stats_enabled);
    }
}
