// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Last-known subject state kept for replay.

use crate::protocol::{FrameData, StaticData, SubjectKey, SubjectSnapshot};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub(crate) struct CachedSubject {
    pub role: String,
    pub frame_shape: String,
    pub static_data: StaticData,
    pub frame: Option<FrameData>,
}

#[derive(Debug, Default)]
pub(crate) struct SubjectCache {
    entries: BTreeMap<SubjectKey, CachedSubject>,
}

impl SubjectCache {
    /// Replace the subject's static data, discarding any cached frame.
    ///
    /// Returns `true` if a frame was discarded.
    pub fn set_static(&mut self, key: SubjectKey, subject: CachedSubject) -> bool {
        self.entries
            .insert(key, subject)
            .map(|previous| previous.frame.is_some())
            .unwrap_or(false)
    }

    pub fn get(&self, key: &SubjectKey) -> Option<&CachedSubject> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &SubjectKey) -> Option<&mut CachedSubject> {
        self.entries.get_mut(key)
    }

    pub fn remove(&mut self, key: &SubjectKey) -> Option<CachedSubject> {
        self.entries.remove(key)
    }

    pub fn keys(&self) -> Vec<SubjectKey> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Every subject's static data and latest frame, in key order.
    pub fn snapshot(&self) -> Vec<SubjectSnapshot> {
        self.entries
            .iter()
            .map(|(key, subject)| SubjectSnapshot {
                subject_name: key.subject_name.clone(),
                role: subject.role.clone(),
                static_data: subject.static_data.clone(),
                frame: subject.frame.clone(),
            })
            .collect()
    }
}
