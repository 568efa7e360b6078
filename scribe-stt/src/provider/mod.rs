//! Multi-provider abstraction for speech-to-text APIs.
//!
//! Provides a unified interface for calling different transcription backends
//! (OpenAI Whisper, Deepgram) with consistent request/response formats.

mod deepgram;
mod error;
mod transport;
mod whisper;

pub use deepgram::DeepgramProvider;
pub use error::{ErrorKind, ProviderError};
pub use transport::CancelHandle;
pub use whisper::WhisperProvider;

use async_trait::async_trait;
use scribe_common::{ProviderSettings, DEEPGRAM, WHISPER};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::{PerformanceProfile, ProviderSpec};
use crate::error::Error;

// ============================================================================
// Provider Trait
// ============================================================================

/// Unified interface for speech-to-text providers.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Stable provider id (e.g., "whisper", "deepgram").
    fn name(&self) -> &str;

    /// Static limits and supported features.
    fn capabilities(&self) -> &ProviderCapabilities;

    /// Declared accuracy/speed/latency characteristics.
    fn profile(&self) -> &PerformanceProfile;

    /// Transcribe one request.
    async fn transcribe(
        &self,
        request: &TranscriptionRequest,
    ) -> Result<TranscriptionResult, ProviderError>;

    /// Estimated cost in USD for `duration_secs` of audio.
    ///
    /// Unknown or absent models are priced at the provider's default model rate.
    fn estimate_cost(&self, duration_secs: f64, model: Option<&str>) -> f64;

    /// Abort requests currently in flight on this instance.
    ///
    /// Awaiting callers resolve with [`ErrorKind::Cancelled`]; requests issued
    /// afterwards are unaffected.
    fn cancel(&self);
}

// ============================================================================
// Capabilities
// ============================================================================

/// Optional provider features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Timestamps,
    WordTimestamps,
    Diarization,
    Streaming,
    Punctuation,
    SmartFormat,
    LanguageDetection,
    Translation,
}

/// Static, declared limits of a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCapabilities {
    /// Maximum upload size in bytes
    pub max_file_size: u64,
    /// Accepted file extensions, lowercase, without dot
    pub audio_formats: BTreeSet<String>,
    /// ISO 639-1 codes; empty means any language
    #[serde(default)]
    pub languages: BTreeSet<String>,
    #[serde(default)]
    pub features: BTreeSet<Feature>,
    /// Declared model identifiers
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub real_time: bool,
}

impl ProviderCapabilities {
    pub fn supports_format(&self, extension: &str) -> bool {
        self.audio_formats.contains(&normalize_extension(extension))
    }

    /// `"auto"` is accepted by every provider.
    pub fn supports_language(&self, language: &str) -> bool {
        let language = language.trim().to_lowercase();
        language == "auto" || self.languages.is_empty() || self.languages.contains(&language)
    }

    pub fn supports_feature(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    pub fn supports_model(&self, model: &str) -> bool {
        self.models.is_empty() || self.models.iter().any(|m| m == model)
    }
}

/// Lowercase an extension and strip a leading dot.
pub fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_lowercase()
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// How much structure the caller wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseDetail {
    /// Plain transcript text
    #[default]
    Text,
    /// Text plus timestamped segments
    Segmented,
}

/// Whisper-only request options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhisperOptions {
    /// Prompt to guide spelling and style
    pub prompt: Option<String>,
    /// Sampling temperature (0.0 - 1.0)
    pub temperature: Option<f32>,
    /// Translate to English instead of transcribing
    #[serde(default)]
    pub translate: bool,
}

/// Deepgram-only request options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepgramOptions {
    #[serde(default)]
    pub diarize: bool,
    #[serde(default = "default_true")]
    pub punctuate: bool,
    #[serde(default)]
    pub smart_format: bool,
    /// Boosted vocabulary
    #[serde(default)]
    pub keywords: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for DeepgramOptions {
    fn default() -> Self {
        Self {
            diarize: false,
            punctuate: true,
            smart_format: false,
            keywords: Vec::new(),
        }
    }
}

/// Provider-specific options, tagged by the backend they apply to.
///
/// An adapter ignores options tagged for a different backend, so a request
/// carrying Deepgram options can still fall back to Whisper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum ProviderOptions {
    #[default]
    None,
    Whisper(WhisperOptions),
    Deepgram(DeepgramOptions),
}

impl ProviderOptions {
    pub fn whisper(&self) -> Option<&WhisperOptions> {
        match self {
            Self::Whisper(opts) => Some(opts),
            _ => None,
        }
    }

    pub fn deepgram(&self) -> Option<&DeepgramOptions> {
        match self {
            Self::Deepgram(opts) => Some(opts),
            _ => None,
        }
    }

    /// Whether speaker labels were requested.
    pub fn wants_diarization(&self) -> bool {
        self.deepgram().is_some_and(|d| d.diarize)
    }

    /// Whether translation to English was requested.
    pub fn wants_translation(&self) -> bool {
        self.whisper().is_some_and(|w| w.translate)
    }
}

/// One transcription job. Built once, never mutated afterwards.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    audio: Arc<[u8]>,
    format: String,
    language: String,
    model: Option<String>,
    options: ProviderOptions,
    detail: ResponseDetail,
    duration_secs: Option<f64>,
    selection_key: Option<String>,
}

impl TranscriptionRequest {
    /// Create a request for `audio` encoded as `format` (file extension).
    pub fn new(audio: impl Into<Arc<[u8]>>, format: &str) -> Self {
        Self {
            audio: audio.into(),
            format: normalize_extension(format),
            language: "auto".to_string(),
            model: None,
            options: ProviderOptions::None,
            detail: ResponseDetail::Text,
            duration_secs: None,
            selection_key: None,
        }
    }

    /// ISO 639-1 language hint, or `"auto"`.
    pub fn with_language(mut self, language: &str) -> Self {
        self.language = language.trim().to_lowercase();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_options(mut self, options: ProviderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_detail(mut self, detail: ResponseDetail) -> Self {
        self.detail = detail;
        self
    }

    /// Known audio duration, used for cost-optimized selection.
    pub fn with_duration(mut self, duration_secs: f64) -> Self {
        self.duration_secs = Some(duration_secs);
        self
    }

    /// Stable key (user or session id) for A/B and round-robin strategies.
    pub fn with_selection_key(mut self, key: impl Into<String>) -> Self {
        self.selection_key = Some(key.into());
        self
    }

    pub fn audio(&self) -> &[u8] {
        &self.audio
    }

    pub fn size(&self) -> u64 {
        self.audio.len() as u64
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Language hint unless it is `"auto"`.
    pub fn explicit_language(&self) -> Option<&str> {
        match self.language.as_str() {
            "" | "auto" => None,
            lang => Some(lang),
        }
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn options(&self) -> &ProviderOptions {
        &self.options
    }

    pub fn detail(&self) -> ResponseDetail {
        self.detail
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.duration_secs
    }

    pub fn selection_key(&self) -> Option<&str> {
        self.selection_key.as_deref()
    }
}

/// A timestamped piece of transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start offset in seconds
    pub start: f64,
    /// End offset in seconds
    pub end: f64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

/// Normalized transcription output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    /// Detected or declared language
    pub language: Option<String>,
    /// Audio duration in seconds
    pub duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<Segment>>,
    /// Provider that produced the transcript
    pub provider: String,
    /// Model that produced the transcript
    pub model: String,
    /// Wall-clock time of the provider call in milliseconds
    pub processing_time_ms: u64,
}

// ============================================================================
// Provider Construction
// ============================================================================

/// Create a provider adapter from its settings and catalog entry.
pub fn create_provider(
    id: &str,
    settings: &ProviderSettings,
    spec: ProviderSpec,
    timeout: Duration,
) -> Result<Arc<dyn TranscriptionProvider>, Error> {
    let api_key = settings
        .credential()
        .ok_or_else(|| Error::MissingCredentials(id.to_string()))?
        .to_string();

    match id {
        WHISPER => {
            let mut provider = WhisperProvider::new(api_key, spec).with_timeout(timeout);
            if let Some(ref url) = settings.base_url {
                provider = provider.with_base_url(url);
            }
            if let Some(ref model) = settings.model {
                provider = provider.with_model(model);
            }
            Ok(Arc::new(provider))
        }
        DEEPGRAM => {
            let mut provider = DeepgramProvider::new(api_key, spec).with_timeout(timeout);
            if let Some(ref url) = settings.base_url {
                provider = provider.with_base_url(url);
            }
            if let Some(ref model) = settings.model {
                provider = provider.with_model(model);
            }
            Ok(Arc::new(provider))
        }
        _ => Err(Error::UnknownProvider(id.to_string())),
    }
}
