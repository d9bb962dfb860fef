// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

/// Errors returned by livelink operations.
///
/// Most protocol-level failures (version mismatch, missing annotations,
/// timeouts) are handled locally and only logged; the variants below are the
/// ones surfaced to callers.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration value rejected by validation.
    Config(String),

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// I/O error with underlying cause.
    IoError(std::io::Error),
    /// Failed to bind an endpoint.
    BindFailed(String),
    /// Send operation failed.
    SendFailed(String),
    /// Endpoint was closed before the operation.
    EndpointClosed,
    /// Encoded message exceeds the transport's datagram limit.
    MessageTooLarge(usize),
    /// Envelope could not be encoded or decoded.
    Codec(String),

    // ========================================================================
    // Data Errors
    // ========================================================================
    /// Role name is not registered.
    UnknownRole(String),
    /// Payload shape does not match the role's expected shape.
    ShapeMismatch {
        /// Shape the role expects.
        expected: String,
        /// Shape that was supplied.
        found: String,
    },
    /// Frame pushed for a subject with no static data.
    MissingStaticData(String),
    /// No sample overlaps the requested time range.
    NotFound,

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Operation invalid for the current state.
    InvalidState(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::IoError(e) => write!(f, "I/O error: {}", e),
            Error::BindFailed(msg) => write!(f, "Bind failed: {}", msg),
            Error::SendFailed(msg) => write!(f, "Send failed: {}", msg),
            Error::EndpointClosed => write!(f, "Endpoint closed"),
            Error::MessageTooLarge(len) => write!(f, "Message too large: {} bytes", len),
            Error::Codec(msg) => write!(f, "Codec error: {}", msg),
            Error::UnknownRole(role) => write!(f, "Unknown role: {}", role),
            Error::ShapeMismatch { expected, found } => {
                write!(f, "Shape mismatch: expected {}, found {}", expected, found)
            }
            Error::MissingStaticData(subject) => {
                write!(f, "No static data for subject {}", subject)
            }
            Error::NotFound => write!(f, "No sample in requested range"),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Codec(e.to_string())
    }
}

impl From<crate::config::ConfigError> for Error {
    fn from(e: crate::config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}

/// Convenient alias for API results using the public `Error` type.
pub type Result<T> = core::result::Result<T, Error>;
