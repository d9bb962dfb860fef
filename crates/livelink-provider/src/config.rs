// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Provider daemon configuration.

use livelink::{LinkConfig, UdpTransportConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// One published subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectConfig {
    pub name: String,

    /// Role name (Basic, Animation, Transform, Camera, Light)
    #[serde(default = "default_role")]
    pub role: String,

    /// Property names carried in every frame
    #[serde(default)]
    pub properties: Vec<String>,
}

impl SubjectConfig {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            properties: Vec::new(),
        }
    }
}

/// Provider daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Name consumers discover and connect by
    #[serde(default = "default_provider_name")]
    pub provider_name: String,

    /// Reported machine name (default: hostname)
    #[serde(default)]
    pub machine_name: Option<String>,

    /// Frames pushed per second for each subject
    #[serde(default = "default_frame_rate")]
    pub frame_rate_hz: f64,

    /// Stamp frames with a timecode at this rate (frames per second)
    #[serde(default)]
    pub timecode_fps: Option<u32>,

    #[serde(default = "default_subjects")]
    pub subjects: Vec<SubjectConfig>,

    #[serde(default)]
    pub transport: UdpTransportConfig,

    #[serde(default)]
    pub link: LinkConfig,
}

fn default_provider_name() -> String {
    "livelink-provider".to_string()
}

fn default_role() -> String {
    "Basic".to_string()
}

fn default_frame_rate() -> f64 {
    30.0
}

fn default_subjects() -> Vec<SubjectConfig> {
    vec![
        SubjectConfig {
            name: "Face".to_string(),
            role: "Animation".to_string(),
            properties: vec!["jawOpen".to_string(), "eyeBlinkLeft".to_string()],
        },
        SubjectConfig::new("Camera", "Camera"),
    ]
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_name: default_provider_name(),
            machine_name: None,
            frame_rate_hz: default_frame_rate(),
            timecode_fps: None,
            subjects: default_subjects(),
            transport: UdpTransportConfig::default(),
            link: LinkConfig::default(),
        }
    }
}

impl ProviderConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Interval between two frames of the same subject.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate_hz)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider_name.is_empty() {
            return Err(ConfigError::InvalidValue(
                "provider_name cannot be empty".into(),
            ));
        }
        if !(self.frame_rate_hz > 0.0 && self.frame_rate_hz <= 1000.0) {
            return Err(ConfigError::InvalidValue(
                "frame_rate_hz must be in (0, 1000]".into(),
            ));
        }
        if self.timecode_fps == Some(0) {
            return Err(ConfigError::InvalidValue(
                "timecode_fps cannot be 0".into(),
            ));
        }
        if self.transport.discovery_port == 0 {
            return Err(ConfigError::InvalidValue(
                "transport.discovery_port cannot be 0".into(),
            ));
        }
        let mut names: Vec<&str> = self.subjects.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        if names.windows(2).any(|w| w[0] == w[1]) {
            return Err(ConfigError::InvalidValue(
                "subject names must be unique".into(),
            ));
        }
        self.link
            .validate()
            .map_err(|e| ConfigError::InvalidValue(format!("link: {}", e)))
    }
}

/// Configuration error types.
#[derive(Debug, Clone)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(s) => write!(f, "I/O error: {}", s),
            Self::ParseError(s) => write!(f, "Parse error: {}", s),
            Self::SerializeError(s) => write!(f, "Serialize error: {}", s),
            Self::InvalidValue(s) => write!(f, "Invalid value: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = ProviderConfig::default();
        assert_eq!(config.frame_rate_hz, 30.0);
        assert_eq!(config.subjects.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = ProviderConfig {
            provider_name: "StageRig".into(),
            timecode_fps: Some(24),
            ..Default::default()
        };

        let file = NamedTempFile::new().unwrap();
        config.to_file(file.path()).unwrap();

        let loaded = ProviderConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded.provider_name, "StageRig");
        assert_eq!(loaded.timecode_fps, Some(24));
        assert_eq!(loaded.subjects, config.subjects);
        assert_eq!(loaded.transport, config.transport);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ProviderConfig = serde_json::from_str(
            r#"{ "provider_name": "Rig", "subjects": [{ "name": "Prop" }] }"#,
        )
        .unwrap();
        assert_eq!(config.subjects[0].role, "Basic");
        assert_eq!(config.transport.discovery_port, UdpTransportConfig::default().discovery_port);
    }

    #[test]
    fn test_validation() {
        let mut config = ProviderConfig::default();

        config.frame_rate_hz = 0.0;
        assert!(config.validate().is_err());

        config.frame_rate_hz = 60.0;
        config.subjects.push(SubjectConfig::new("Face", "Basic"));
        assert!(config.validate().is_err());

        config.subjects.pop();
        config.timecode_fps = Some(0);
        assert!(config.validate().is_err());
    }
}
