// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subject payloads.
//!
//! Payloads are tagged by a *shape* name (the schema they follow). Concrete
//! skeleton or curve schemas live outside this crate; here a payload is a
//! list of named properties and, for frames, their values.

use crate::time::SampleTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifies one named stream within one source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectKey {
    pub source_id: String,
    pub subject_name: String,
}

impl SubjectKey {
    pub fn new(source_id: impl Into<String>, subject_name: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            subject_name: subject_name.into(),
        }
    }
}

impl std::fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.source_id, self.subject_name)
    }
}

/// Static (schema-defining) data of a subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticData {
    pub shape: String,
    #[serde(default)]
    pub property_names: Vec<String>,
}

impl StaticData {
    pub fn new(shape: impl Into<String>) -> Self {
        Self {
            shape: shape.into(),
            property_names: Vec::new(),
        }
    }

    pub fn with_properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.property_names = names.into_iter().map(Into::into).collect();
        self
    }
}

/// One timestamped frame of a subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameData {
    pub shape: String,
    pub time: SampleTime,
    #[serde(default)]
    pub property_values: Vec<f32>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl FrameData {
    pub fn new(shape: impl Into<String>, time: SampleTime) -> Self {
        Self {
            shape: shape.into(),
            time,
            property_values: Vec::new(),
            meta: BTreeMap::new(),
        }
    }

    pub fn with_values(mut self, values: Vec<f32>) -> Self {
        self.property_values = values;
        self
    }
}

/// Cached state of one subject, replayed to new consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectSnapshot {
    pub subject_name: String,
    pub role: String,
    pub static_data: StaticData,
    #[serde(default)]
    pub frame: Option<FrameData>,
}
