//! Settings validation.
//!
//! Provides validation logic for settings fields to ensure all provider
//! references resolve and numeric values are within valid ranges.

use thiserror::Error;

use crate::config::{AbTestSettings, ProviderSettings, Settings, KNOWN_PROVIDERS};

/// Settings validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Unknown provider '{provider}' in {field}")]
    UnknownProvider { field: String, provider: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable settings sections.
pub trait Validate {
    /// Validate this settings section.
    fn validate(&self) -> ValidationResult<()>;
}

fn check_known(field: &str, provider: &str) -> ValidationResult<()> {
    if KNOWN_PROVIDERS.contains(&provider) {
        Ok(())
    } else {
        Err(ValidationError::UnknownProvider {
            field: field.to_string(),
            provider: provider.to_string(),
        })
    }
}

impl Validate for Settings {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Some(pinned) = self.pinned_provider() {
            if let Err(e) = check_known("provider", pinned) {
                errors.push(e);
            }
        }

        if self.default_provider.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "defaultProvider".into(),
            });
        } else if let Err(e) = check_known("defaultProvider", &self.default_provider) {
            errors.push(e);
        }

        if self.request_timeout_secs == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "requestTimeoutSecs".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if let Err(e) = self.ab_test.validate() {
            errors.push(e);
        }

        for (field, provider) in [("whisper", &self.whisper), ("deepgram", &self.deepgram)] {
            if let Err(e) = validate_provider(field, provider) {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }
}

impl Validate for AbTestSettings {
    fn validate(&self) -> ValidationResult<()> {
        if !(0.0..=1.0).contains(&self.split) {
            return Err(ValidationError::InvalidValue {
                field: "abTest.split".into(),
                reason: format!("{} is outside [0, 1]", self.split),
            });
        }

        if let Some(ref a) = self.variant_a {
            check_known("abTest.variantA", a)?;
        }
        if let Some(ref b) = self.variant_b {
            check_known("abTest.variantB", b)?;
        }

        if let (Some(a), Some(b)) = (&self.variant_a, &self.variant_b) {
            if a == b {
                return Err(ValidationError::InvalidValue {
                    field: "abTest.variantB".into(),
                    reason: "must differ from variantA".into(),
                });
            }
        }

        Ok(())
    }
}

fn validate_provider(field: &str, provider: &ProviderSettings) -> ValidationResult<()> {
    if let Some(ref url) = provider.base_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ValidationError::InvalidValue {
                field: format!("{field}.baseUrl"),
                reason: format!("'{url}' is not an http(s) URL"),
            });
        }
    }

    if let Some(ref model) = provider.model {
        if model.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: format!("{field}.model"),
                reason: "must not be blank".into(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_unknown_pinned_provider() {
        let settings = Settings {
            provider: "assemblyai".into(),
            ..Default::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ValidationError::UnknownProvider { ref field, .. } if field == "provider"));
    }

    #[test]
    fn test_split_out_of_range() {
        let mut settings = Settings::default();
        settings.ab_test.split = 1.5;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("abTest.split"));
    }

    #[test]
    fn test_identical_variants_rejected() {
        let ab = AbTestSettings {
            split: 0.5,
            variant_a: Some("whisper".into()),
            variant_b: Some("whisper".into()),
        };
        assert!(ab.validate().is_err());
    }

    #[test]
    fn test_collects_multiple_errors() {
        let mut settings = Settings {
            default_provider: String::new(),
            request_timeout_secs: 0,
            ..Default::default()
        };
        settings.deepgram.base_url = Some("ftp://example.com".into());

        match settings.validate().unwrap_err() {
            ValidationError::Multiple(errors) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }
}
