//! Pre-dispatch capability checks.
//!
//! Runs before any network call so oversized or unsupported files never
//! reach a paid API.

use serde::Serialize;

use crate::provider::{
    normalize_extension, ErrorKind, Feature, ProviderCapabilities, TranscriptionRequest,
};

/// Files above this size produce a warning (but are still accepted).
pub const SOFT_SIZE_LIMIT: u64 = 10 * 1024 * 1024;

/// Outcome of a capability check.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(skip)]
    oversize: bool,
}

impl ValidationReport {
    fn new() -> Self {
        Self {
            valid: true,
            ..Default::default()
        }
    }

    fn error(&mut self, message: String) {
        self.valid = false;
        self.errors.push(message);
    }

    fn warn(&mut self, message: String) {
        self.warnings.push(message);
    }

    /// Error kind to report when the file is rejected.
    pub fn rejection_kind(&self) -> Option<ErrorKind> {
        if self.valid {
            None
        } else if self.oversize {
            Some(ErrorKind::PayloadTooLarge)
        } else {
            Some(ErrorKind::Unsupported)
        }
    }
}

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

fn to_mb(bytes: u64) -> u64 {
    (bytes as f64 / BYTES_PER_MB).round() as u64
}

/// Whole MB rounded up, so an oversized file never reports the limit itself.
fn to_mb_ceil(bytes: u64) -> u64 {
    (bytes as f64 / BYTES_PER_MB).ceil() as u64
}

/// Check a file's size and extension against a provider's capabilities.
///
/// Rules, in order: extension must be supported; size must not exceed
/// `max_file_size`; sizes above [`SOFT_SIZE_LIMIT`] add a warning.
pub fn validate(size_bytes: u64, extension: &str, caps: &ProviderCapabilities) -> ValidationReport {
    let mut report = ValidationReport::new();
    let extension = normalize_extension(extension);

    if !caps.supports_format(&extension) {
        let supported: Vec<&str> = caps.audio_formats.iter().map(String::as_str).collect();
        report.error(format!(
            "Unsupported audio format '{}'. Supported formats: {}",
            extension,
            supported.join(", ")
        ));
    }

    if size_bytes > caps.max_file_size {
        report.oversize = true;
        report.error(format!(
            "File size ({} MB) exceeds the maximum allowed size ({} MB)",
            to_mb_ceil(size_bytes),
            to_mb(caps.max_file_size)
        ));
    } else if size_bytes > SOFT_SIZE_LIMIT {
        report.warn(format!(
            "Large file ({} MB) may take longer to process",
            to_mb(size_bytes)
        ));
    }

    report
}

/// Full request check: file rules plus language, requested features and model.
pub fn validate_request(
    request: &TranscriptionRequest,
    caps: &ProviderCapabilities,
) -> ValidationReport {
    let mut report = validate(request.size(), request.format(), caps);

    if let Some(language) = request.explicit_language() {
        if !caps.supports_language(language) {
            report.error(format!("Language '{language}' is not supported"));
        }
    }

    if request.options().wants_diarization() && !caps.supports_feature(Feature::Diarization) {
        report.error("Speaker diarization is not supported".to_string());
    }

    if request.options().wants_translation() && !caps.supports_feature(Feature::Translation) {
        report.error("Translation is not supported".to_string());
    }

    if let Some(model) = request.model() {
        if !caps.supports_model(model) {
            report.warn(format!("Model '{model}' is not offered; the default model will be used"));
        }
    }

    report
}
