// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Synthetic subject source.
//!
//! Each configured subject is defined once, then gets one frame per tick with
//! property values following phase-shifted sine waves.

use crate::config::SubjectConfig;
use livelink::{
    FrameData, FrameRate, ProviderRegistry, QualifiedFrameTime, RoleRegistry, SampleTime,
    StaticData, SubjectKey,
};
use tracing::{debug, warn};

struct SyntheticSubject {
    key: SubjectKey,
    role: String,
    static_shape: String,
    frame_shape: String,
    properties: Vec<String>,
    phase: f64,
}

/// Generates frames for every configured subject.
pub struct SyntheticSource {
    subjects: Vec<SyntheticSubject>,
    timecode: Option<FrameRate>,
    frames_pushed: u64,
}

impl SyntheticSource {
    /// Subjects whose role is not registered are skipped with a warning.
    pub fn new(
        provider: &ProviderRegistry,
        roles: &RoleRegistry,
        subjects: &[SubjectConfig],
        timecode_fps: Option<u32>,
    ) -> Self {
        let subjects = subjects
            .iter()
            .enumerate()
            .filter_map(|(i, subject)| {
                let Some(schema) = roles.get(&subject.role) else {
                    warn!(
                        "Subject '{}' skipped: unknown role '{}'",
                        subject.name, subject.role
                    );
                    return None;
                };
                Some(SyntheticSubject {
                    key: provider.subject_key(&subject.name),
                    role: schema.name,
                    static_shape: schema.static_shape,
                    frame_shape: schema.frame_shape,
                    properties: subject.properties.clone(),
                    phase: i as f64 * 0.7,
                })
            })
            .collect();

        Self {
            subjects,
            timecode: timecode_fps.map(|fps| FrameRate::new(fps, 1)),
            frames_pushed: 0,
        }
    }

    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    pub fn frames_pushed(&self) -> u64 {
        self.frames_pushed
    }

    /// Publish static data for every subject.
    pub fn define(&self, provider: &ProviderRegistry) -> livelink::Result<()> {
        for subject in &self.subjects {
            let data =
                StaticData::new(subject.static_shape.clone()).with_properties(&subject.properties);
            provider.update_subject_static_data(&subject.key, &subject.role, data)?;
            debug!("Defined subject {} ({})", subject.key, subject.role);
        }
        Ok(())
    }

    /// Push one frame per subject stamped at `now` (provider platform seconds).
    ///
    /// Returns the number of frames accepted.
    pub fn tick(&mut self, provider: &ProviderRegistry, now: f64) -> usize {
        let mut pushed = 0;
        for subject in &self.subjects {
            let mut time = SampleTime::from_platform(now);
            if let Some(rate) = self.timecode {
                let tc = QualifiedFrameTime::from_seconds(now, rate);
                time = time.with_timecode(QualifiedFrameTime::new(tc.frame.floor(), rate));
            }
            let values = subject
                .properties
                .iter()
                .enumerate()
                .map(|(k, _)| wave(now, subject.phase + k as f64 * 0.3))
                .collect();
            let frame = FrameData::new(subject.frame_shape.clone(), time).with_values(values);
            match provider.push_frame(&subject.key, frame) {
                Ok(()) => pushed += 1,
                Err(e) => warn!("Frame for {} rejected: {}", subject.key, e),
            }
        }
        self.frames_pushed += pushed as u64;
        pushed
    }
}

fn wave(t: f64, phase: f64) -> f32 {
    (0.5 + 0.5 * (t * std::f64::consts::TAU * 0.25 + phase).sin()) as f32
}
