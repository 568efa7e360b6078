//! Errors surfaced by the provider factory.

use thiserror::Error;

use crate::provider::{ErrorKind, ProviderError};
use crate::selection::SelectionError;

/// Factory error.
#[derive(Debug, Error)]
pub enum Error {
    /// The adapter was called and failed
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The request failed capability checks and was never dispatched
    #[error("[{provider}] request rejected ({kind}): {}", errors.join("; "))]
    Rejected {
        provider: String,
        kind: ErrorKind,
        errors: Vec<String>,
    },

    #[error("No provider available: {0}")]
    NoProviderAvailable(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Provider '{0}' has no credentials configured")]
    MissingCredentials(String),

    #[error("Settings error: {0}")]
    Settings(#[from] scribe_common::Error),
}

impl Error {
    /// Provider error kind, when the failure has one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Provider(e) => Some(e.kind),
            Self::Rejected { kind, .. } => Some(*kind),
            Self::MissingCredentials(_) => Some(ErrorKind::Unauthorized),
            _ => None,
        }
    }

    /// Whether another provider might succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider(e) if e.retryable)
    }
}

impl From<SelectionError> for Error {
    fn from(err: SelectionError) -> Self {
        Self::NoProviderAvailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
