// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Link configuration.
//!
//! Owned by the embedding application; the core only reads it. Every field
//! has a serde default so partial JSON files are accepted.

use crate::buffer::BufferPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Runtime configuration shared by discovery, providers and links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Interval between discovery pings while interest is held (seconds)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: f64,

    /// Interval between consumer heartbeats (seconds)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: f64,

    /// Silence after which a link is reported as not responding (seconds)
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: f64,

    /// Silence after which a link is torn down and removed (seconds)
    #[serde(default = "default_dead_source_timeout")]
    pub dead_source_timeout_secs: f64,

    /// Provider-side roster validity window (seconds)
    #[serde(default = "default_provider_connection_timeout")]
    pub provider_connection_timeout_secs: f64,

    /// Global clamp applied to every buffer size
    #[serde(default)]
    pub buffer_policy: BufferPolicy,

    /// Buffer size given to new subjects
    #[serde(default = "default_buffer_size")]
    pub default_buffer_size: usize,

    /// Exponential smoothing factor for ramped clock offsets, in (0, 1]
    #[serde(default = "default_clock_smoothing")]
    pub clock_smoothing: f64,

    /// Track buffer under/overflow statistics on evaluation
    #[serde(default = "default_true")]
    pub stats_enabled: bool,
}

fn default_ping_interval() -> f64 {
    1.0
}

fn default_heartbeat_interval() -> f64 {
    1.0
}

fn default_heartbeat_timeout() -> f64 {
    2.0
}

fn default_dead_source_timeout() -> f64 {
    30.0
}

fn default_provider_connection_timeout() -> f64 {
    10.0
}

fn default_buffer_size() -> usize {
    10
}

fn default_clock_smoothing() -> f64 {
    0.1
}

fn default_true() -> bool {
    true
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_interval(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            heartbeat_timeout_secs: default_heartbeat_timeout(),
            dead_source_timeout_secs: default_dead_source_timeout(),
            provider_connection_timeout_secs: default_provider_connection_timeout(),
            buffer_policy: BufferPolicy::default(),
            default_buffer_size: default_buffer_size(),
            clock_smoothing: default_clock_smoothing(),
            stats_enabled: true,
        }
    }
}

impl LinkConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Self =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Discovery ping interval as Duration.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs_f64(self.ping_interval_secs)
    }

    /// Heartbeat emission interval as Duration.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs_f64(self.heartbeat_interval_secs)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("ping_interval_secs", self.ping_interval_secs),
            ("heartbeat_interval_secs", self.heartbeat_interval_secs),
            ("heartbeat_timeout_secs", self.heartbeat_timeout_secs),
            ("dead_source_timeout_secs", self.dead_source_timeout_secs),
            (
                "provider_connection_timeout_secs",
                self.provider_connection_timeout_secs,
            ),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidValue(format!("{} must be > 0", name)));
            }
        }
        if self.dead_source_timeout_secs <= self.heartbeat_timeout_secs {
            return Err(ConfigError::InvalidValue(
                "dead_source_timeout_secs must exceed heartbeat_timeout_secs".into(),
            ));
        }
        if self.provider_connection_timeout_secs >= self.dead_source_timeout_secs {
            return Err(ConfigError::InvalidValue(
                "provider_connection_timeout_secs must be shorter than dead_source_timeout_secs"
                    .into(),
            ));
        }
        self.buffer_policy
            .validate()
            .map_err(|e| ConfigError::InvalidValue(e.into()))?;
        if self.buffer_policy.clamp(self.default_buffer_size) != self.default_buffer_size {
            return Err(ConfigError::InvalidValue(format!(
                "default_buffer_size {} outside [{}, {}]",
                self.default_buffer_size,
                self.buffer_policy.min_allowed,
                self.buffer_policy.max_allowed
            )));
        }
        if !(self.clock_smoothing > 0.0 && self.clock_smoothing <= 1.0) {
            return Err(ConfigError::InvalidValue(
                "clock_smoothing must be in (0, 1]".into(),
            ));
        }
        Ok(())
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
