//! Error types for booking-relay.

use std::time::Duration;

/// Configuration-related errors.
///
/// Document-level variants (`Io`, `ParseError`) stop a config load. Target-level
/// variants are produced during resolution and only disqualify that one target.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Target {target} has no url")]
    MissingUrl { target: String },

    #[error("Target {target} has invalid url {url:?}: {reason}")]
    InvalidUrl {
        target: String,
        url: String,
        reason: String,
    },

    #[error("Target {target} uses unsupported method {method:?}")]
    InvalidMethod { target: String, method: String },

    #[error("Target {target} has invalid timeout {seconds}s")]
    InvalidTimeout { target: String, seconds: String },

    #[error("Target {target} has invalid header {header:?}")]
    InvalidHeader { target: String, header: String },

    #[error("Target {target} maps reserved payload key {key:?}")]
    ReservedKey { target: String, key: String },
}

impl ConfigError {
    /// Name of the target this error disqualifies, if it is target-level.
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Io(_) | Self::ParseError(_) => None,
            Self::MissingUrl { target }
            | Self::InvalidUrl { target, .. }
            | Self::InvalidMethod { target, .. }
            | Self::InvalidTimeout { target, .. }
            | Self::InvalidHeader { target, .. }
            | Self::ReservedKey { target, .. } => Some(target),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::ParseError(e.to_string())
    }
}

/// Errors turning raw bytes into a `RawEmail`.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Message could not be parsed as RFC 822")]
    Unparseable,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A rendered payload could not be serialized for the wire.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EncodeError {
    #[error("JSON encoding failed: {0}")]
    Json(String),
}

impl From<serde_json::Error> for EncodeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

/// Failure of a single delivery attempt below the HTTP status layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request failed: {0}")]
    Request(String),
}
