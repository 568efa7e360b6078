//! Error types shared by Scribe crates.

use thiserror::Error;

use crate::validation::ValidationError;

/// Result type alias using the Scribe common error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading, validating or persisting settings.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider id not known to the settings schema
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Settings failed schema validation
    #[error("Invalid settings: {0}")]
    Validation(#[from] ValidationError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Check if this error (or its wrapped source) is a validation failure.
    pub fn is_validation(&self) -> bool {
        match self {
            Self::Validation(_) => true,
            Self::WithContext { source, .. } => source.is_validation(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to any error type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_with_context_keeps_source() {
        let err = Error::Config("missing key".into()).with_context("loading settings");
        assert!(matches!(err, Error::WithContext { .. }));
        assert_eq!(err.to_string(), "loading settings: Configuration error: missing key");
    }

    #[test]
    fn test_is_validation_sees_through_context() {
        let err: Error = ValidationError::MissingField {
            field: "defaultProvider".into(),
        }
        .into();
        assert!(err.is_validation());
        assert!(err.with_context("saving").is_validation());
        assert!(!Error::UnknownProvider("x".into()).is_validation());
    }

    #[test]
    fn test_result_ext_context() {
        let raw: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "gone",
        ));
        let err = raw.context("reading settings.json").unwrap_err();
        assert!(err.to_string().starts_with("reading settings.json: IO error"));
    }
}
