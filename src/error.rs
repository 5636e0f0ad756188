//! Error types and handling for the Combined Energy client
//!
//! This module defines the error types used throughout the crate. The
//! variants follow the failure taxonomy the pollers care about: credential
//! problems (`Auth`), HTTP/network failures (`Transport`, `Timeout`) and
//! payload shape mismatches (`Decode`).

use thiserror::Error;

/// Result type alias for Combined Energy operations
pub type Result<T> = std::result::Result<T, CombinedEnergyError>;

/// Main error type for the Combined Energy client
#[derive(Debug, Clone, Error)]
pub enum CombinedEnergyError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Configuration file (de)serialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Bad credentials, or a session that could not be recovered by re-login
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// HTTP or network failure
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        /// HTTP status when the server answered
        status: Option<u16>,
        /// Whether the retry policy considers this failure transient
        retryable: bool,
    },

    /// Request exceeded its configured timeout
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Payload did not match the expected shape
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl CombinedEnergyError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a transport error that carries no HTTP status (connection reset, DNS, ...)
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
            retryable: false,
        }
    }

    /// Create a transport error for an HTTP error status
    pub fn http_status(status: u16, retryable: bool) -> Self {
        Self::Transport {
            message: format!("HTTP status {}", status),
            status: Some(status),
            retryable,
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// True for credential failures that a retry will not fix
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    /// True when the upstream answered 401
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                status: Some(401),
                ..
            }
        )
    }

    /// True when the transport retry policy may repeat the request
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                retryable: true,
                ..
            }
        )
    }

    /// HTTP status carried by a transport error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<std::io::Error> for CombinedEnergyError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for CombinedEnergyError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

// JSON only ever flows in from the upstream API, so a failure is a payload mismatch
impl From<serde_json::Error> for CombinedEnergyError {
    fn from(err: serde_json::Error) -> Self {
        Self::decode(err.to_string())
    }
}

impl From<reqwest::Error> for CombinedEnergyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::timeout(err.to_string());
        }
        if err.is_decode() {
            return Self::decode(err.to_string());
        }
        Self::Transport {
            message: err.to_string(),
            status: err.status().map(|s| s.as_u16()),
            retryable: false,
        }
    }
}

impl From<chrono::ParseError> for CombinedEnergyError {
    fn from(err: chrono::ParseError) -> Self {
        Self::validation("datetime", &err.to_string())
    }
}
