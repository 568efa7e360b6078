//! Provider error taxonomy.
//!
//! Every adapter maps its backend's status codes and transport failures onto
//! [`ErrorKind`]; the factory only ever looks at the kind and the
//! `retryable` flag when deciding whether to fall back.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or missing credential
    Unauthorized,
    /// Upstream throttling
    RateLimited,
    /// File exceeds the provider's limit
    PayloadTooLarge,
    /// Language, format or feature not supported
    Unsupported,
    /// Connection failure or timeout
    Network,
    /// Upstream 5xx
    ServerError,
    /// Aborted by the caller
    Cancelled,
    /// Anything the adapter could not classify
    Unknown,
}

impl ErrorKind {
    /// Whether a failure of this kind may succeed on another provider.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::Network | Self::ServerError)
    }

    /// Map an HTTP status code to a kind.
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Unauthorized,
            429 => Self::RateLimited,
            413 => Self::PayloadTooLarge,
            400 | 415 | 422 => Self::Unsupported,
            408 => Self::Network,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::RateLimited => "rate_limited",
            Self::PayloadTooLarge => "payload_too_large",
            Self::Unsupported => "unsupported",
            Self::Network => "network",
            Self::ServerError => "server_error",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error from a provider adapter.
#[derive(Debug, Clone, Error)]
#[error("[{provider}] {kind}: {message}")]
pub struct ProviderError {
    pub provider: String,
    pub kind: ErrorKind,
    pub retryable: bool,
    pub message: String,
    pub status: Option<u16>,
}

impl ProviderError {
    /// Create an error whose retryability follows its kind.
    pub fn new(provider: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind,
            retryable: kind.is_retryable(),
            message: message.into(),
            status: None,
        }
    }

    /// Create an error from a non-success HTTP response.
    pub fn from_status(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        let mut err = Self::new(provider, ErrorKind::from_status(status), message);
        err.status = Some(status);
        err
    }

    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::Network, message)
    }

    pub fn cancelled(provider: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::Cancelled, "request cancelled")
    }

    pub fn timeout(provider: impl Into<String>, secs: u64) -> Self {
        Self::new(provider, ErrorKind::Network, format!("request timed out after {secs}s"))
    }

    /// Classify a transport-level reqwest failure.
    pub fn from_reqwest(provider: impl Into<String>, err: &reqwest::Error) -> Self {
        let provider = provider.into();
        if let Some(status) = err.status() {
            return Self::from_status(provider, status.as_u16(), err.to_string());
        }
        if err.is_timeout() {
            return Self::new(provider, ErrorKind::Network, format!("request timed out: {err}"));
        }
        if err.is_decode() {
            return Self::new(provider, ErrorKind::Unknown, format!("invalid response body: {err}"));
        }
        if err.is_builder() {
            return Self::new(provider, ErrorKind::Unknown, format!("invalid request: {err}"));
        }
        Self::new(provider, ErrorKind::Network, format!("request failed: {err}"))
    }
}
