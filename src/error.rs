//! Error types for initfetch
//!
//! Every failure an operation can observe is folded into [`FetchError`] and
//! stored in the operation's lifecycle state, so the type is `Clone` and keeps
//! its payloads as strings.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors surfaced by a session or one of its operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Network-level failure reported by the transport.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-success status, raised through [`crate::HttpResponse::error_for_status`].
    #[error("HTTP {status} returned by {url}")]
    Status { status: StatusCode, url: String },

    /// Error raised by a caller-supplied callback.
    #[error("Callback error: {0}")]
    Callback(String),

    /// Response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Header name or value rejected while building request options.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Session or transport configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The request's abort signal fired before it settled.
    #[error("Request aborted")]
    Aborted,
}

impl FetchError {
    /// Wrap any displayable error raised inside a callback.
    pub fn callback(err: impl std::fmt::Display) -> Self {
        Self::Callback(err.to_string())
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderName> for FetchError {
    fn from(err: reqwest::header::InvalidHeaderName) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderValue> for FetchError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

/// Result type for initfetch operations
pub type Result<T> = std::result::Result<T, FetchError>;
