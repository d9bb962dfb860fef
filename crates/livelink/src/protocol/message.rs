// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Link messages and their envelope.

use super::data::{FrameData, StaticData, SubjectSnapshot};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Protocol version; peers must match exactly.
pub const PROTOCOL_VERSION: u32 = 2;

/// Annotation key carrying the subject name on static/frame data.
pub const ANNOTATION_SUBJECT_NAME: &str = "subject_name";

/// Annotation key carrying the role name on static data.
pub const ANNOTATION_ROLE: &str = "role";

/// String annotations attached to an envelope.
pub type Annotations = BTreeMap<String, String>;

/// Link protocol message types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LinkMessage {
    /// Consumer looks for providers (broadcast).
    #[serde(rename = "ping")]
    Ping { request_id: u64, protocol_version: u32 },

    /// Provider answers a ping (unicast).
    #[serde(rename = "pong")]
    Pong {
        provider_name: String,
        machine_name: String,
        request_id: u64,
        protocol_version: u32,
        creation_platform_time: f64,
    },

    /// Consumer subscribes to a provider.
    #[serde(rename = "connect")]
    Connect { protocol_version: u32 },

    /// Liveness, consumer to provider and echoed back.
    #[serde(rename = "heartbeat")]
    Heartbeat,

    /// Provider removed a subject.
    #[serde(rename = "clear_subject")]
    ClearSubject { subject_name: String },

    /// Subject static data (annotated with subject name and role).
    #[serde(rename = "static_data")]
    StaticData(StaticData),

    /// Subject frame data (annotated with subject name).
    #[serde(rename = "frame_data")]
    FrameData(FrameData),

    /// Full cached provider state sent to a newly connected consumer.
    #[serde(rename = "state_snapshot")]
    StateSnapshot { subjects: Vec<SubjectSnapshot> },
}

impl LinkMessage {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            LinkMessage::Ping { .. } => "Ping",
            LinkMessage::Pong { .. } => "Pong",
            LinkMessage::Connect { .. } => "Connect",
            LinkMessage::Heartbeat => "Heartbeat",
            LinkMessage::ClearSubject { .. } => "ClearSubject",
            LinkMessage::StaticData(_) => "StaticData",
            LinkMessage::FrameData(_) => "FrameData",
            LinkMessage::StateSnapshot { .. } => "StateSnapshot",
        }
    }
}

/// Message plus transport metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender wall-clock seconds at send time
    pub sent_at: f64,
    #[serde(default)]
    pub annotations: Annotations,
    pub message: LinkMessage,
}

impl Envelope {
    pub fn new(message: LinkMessage, sent_at: f64) -> Self {
        Self {
            sent_at,
            annotations: Annotations::new(),
            message,
        }
    }

    /// Builder: add an annotation.
    pub fn annotate(mut self, key: &str, value: impl Into<String>) -> Self {
        self.annotations.insert(key.to_string(), value.into());
        self
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
