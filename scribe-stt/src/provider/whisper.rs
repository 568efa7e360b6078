//! OpenAI Whisper adapter.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};

use scribe_common::WHISPER;

use super::error::ProviderError;
use super::transport::{self, CancelHandle, DEFAULT_TIMEOUT};
use super::{
    ProviderCapabilities, ResponseDetail, Segment, TranscriptionProvider, TranscriptionRequest,
    TranscriptionResult,
};
use crate::catalog::{PerformanceProfile, ProviderSpec};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// OpenAI Whisper API provider.
pub struct WhisperProvider {
    api_key: String,
    client: Client,
    base_url: String,
    model: String,
    spec: ProviderSpec,
    timeout: Duration,
    cancel: CancelHandle,
}

#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    segments: Option<Vec<WhisperSegment>>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

impl WhisperProvider {
    pub fn new(api_key: impl Into<String>, spec: ProviderSpec) -> Self {
        Self {
            api_key: api_key.into(),
            client: transport::build_client(DEFAULT_TIMEOUT),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: spec.pricing.default_model.clone(),
            spec,
            timeout: DEFAULT_TIMEOUT,
            cancel: CancelHandle::new(),
        }
    }

    /// Override the API root (self-hosted gateways, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Model used when the request does not name a supported one.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.client = transport::build_client(timeout);
        self
    }

    fn resolve_model<'a>(&'a self, request: &'a TranscriptionRequest) -> &'a str {
        request
            .model()
            .filter(|m| self.spec.capabilities.supports_model(m))
            .unwrap_or(&self.model)
    }

    fn build_form(&self, request: &TranscriptionRequest, model: &str) -> Result<Form, ProviderError> {
        let part = Part::bytes(request.audio().to_vec())
            .file_name(format!("audio.{}", request.format()))
            .mime_str(transport::mime_type(request.format()))
            .map_err(|e| ProviderError::from_reqwest(WHISPER, &e))?;

        let response_format = match request.detail() {
            ResponseDetail::Text => "json",
            ResponseDetail::Segmented => "verbose_json",
        };

        let mut form = Form::new()
            .part("file", part)
            .text("model", model.to_string())
            .text("response_format", response_format);

        let options = request.options().whisper();
        let translate = options.is_some_and(|o| o.translate);

        if !translate {
            if let Some(language) = request.explicit_language() {
                form = form.text("language", language.to_string());
            }
        }
        if let Some(opts) = options {
            if let Some(ref prompt) = opts.prompt {
                form = form.text("prompt", prompt.clone());
            }
            if let Some(temperature) = opts.temperature {
                form = form.text("temperature", temperature.clamp(0.0, 1.0).to_string());
            }
        }
        Ok(form)
    }

    async fn send(
        &self,
        request: &TranscriptionRequest,
        model: &str,
    ) -> Result<WhisperResponse, ProviderError> {
        let endpoint = if request.options().wants_translation() {
            "translations"
        } else {
            "transcriptions"
        };
        let url = format!("{}/v1/audio/{}", self.base_url, endpoint);
        let form = self.build_form(request, model)?;

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(WHISPER, &e))?;

        let response = transport::check_status(WHISPER, response).await?;
        response
            .json::<WhisperResponse>()
            .await
            .map_err(|e| ProviderError::from_reqwest(WHISPER, &e))
    }
}

#[async_trait]
impl TranscriptionProvider for WhisperProvider {
    fn name(&self) -> &str {
        WHISPER
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.spec.capabilities
    }

    fn profile(&self) -> &PerformanceProfile {
        &self.spec.profile
    }

    async fn transcribe(
        &self,
        request: &TranscriptionRequest,
    ) -> Result<TranscriptionResult, ProviderError> {
        let model = self.resolve_model(request).to_string();
        let token = self.cancel.token();
        let started = Instant::now();

        tracing::debug!(
            model = %model,
            bytes = request.size(),
            format = %request.format(),
            "Sending Whisper request"
        );

        let body = transport::guarded(WHISPER, self.timeout, &token, self.send(request, &model)).await?;

        let language = body
            .language
            .as_deref()
            .map(language_code)
            .or_else(|| request.explicit_language().map(str::to_string));

        let segments = match request.detail() {
            ResponseDetail::Text => None,
            ResponseDetail::Segmented => Some(
                body.segments
                    .unwrap_or_default()
                    .into_iter()
                    .map(|s| Segment {
                        start: s.start,
                        end: s.end,
                        text: s.text.trim().to_string(),
                        speaker: None,
                    })
                    .collect(),
            ),
        };

        Ok(TranscriptionResult {
            text: body.text.trim().to_string(),
            language,
            duration_secs: body.duration,
            segments,
            provider: WHISPER.to_string(),
            model,
            processing_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn estimate_cost(&self, duration_secs: f64, model: Option<&str>) -> f64 {
        self.spec.pricing.estimate(duration_secs, model)
    }

    fn cancel(&self) {
        tracing::debug!("Cancelling in-flight Whisper requests");
        self.cancel.cancel();
    }
}

/// Whisper reports detected languages by English name; normalize to ISO 639-1.
fn language_code(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let code = match lower.as_str() {
        "afrikaans" => "af",
        "arabic" => "ar",
        "armenian" => "hy",
        "azerbaijani" => "az",
        "belarusian" => "be",
        "bosnian" => "bs",
        "bulgarian" => "bg",
        "catalan" => "ca",
        "chinese" => "zh",
        "croatian" => "hr",
        "czech" => "cs",
        "danish" => "da",
        "dutch" => "nl",
        "english" => "en",
        "estonian" => "et",
        "finnish" => "fi",
        "french" => "fr",
        "galician" => "gl",
        "german" => "de",
        "greek" => "el",
        "hebrew" => "he",
        "hindi" => "hi",
        "hungarian" => "hu",
        "icelandic" => "is",
        "indonesian" => "id",
        "italian" => "it",
        "japanese" => "ja",
        "kannada" => "kn",
        "kazakh" => "kk",
        "korean" => "ko",
        "latvian" => "lv",
        "lithuanian" => "lt",
        "macedonian" => "mk",
        "malay" => "ms",
        "marathi" => "mr",
        "maori" => "mi",
        "nepali" => "ne",
        "norwegian" => "no",
        "persian" => "fa",
        "polish" => "pl",
        "portuguese" => "pt",
        "romanian" => "ro",
        "russian" => "ru",
        "serbian" => "sr",
        "slovak" => "sk",
        "slovenian" => "sl",
        "spanish" => "es",
        "swahili" => "sw",
        "swedish" => "sv",
        "tagalog" => "tl",
        "tamil" => "ta",
        "thai" => "th",
        "turkish" => "tr",
        "ukrainian" => "uk",
        "urdu" => "ur",
        "vietnamese" => "vi",
        "welsh" => "cy",
        _ => return lower,
    };
    code.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ProviderCatalog;

    fn provider() -> WhisperProvider {
        WhisperProvider::new("sk-test", ProviderCatalog::builtin().get(WHISPER).cloned().unwrap())
    }

    #[test]
    fn test_defaults() {
        let p = provider();
        assert_eq!(p.model, "whisper-1");
        assert_eq!(p.base_url, "https://api.openai.com");
        assert_eq!(p.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let p = provider().with_base_url("http://localhost:8080/");
        assert_eq!(p.base_url, "http://localhost:8080");
    }

    #[test]
    fn test_unsupported_request_model_uses_default() {
        let p = provider();
        let request = TranscriptionRequest::new(vec![0u8], "mp3").with_model("nova-2");
        assert_eq!(p.resolve_model(&request), "whisper-1");
    }

    #[test]
    fn test_language_names_map_to_codes() {
        assert_eq!(language_code("English"), "en");
        assert_eq!(language_code("chinese"), "zh");
        assert_eq!(language_code("en"), "en");
    }

    #[test]
    fn test_cost_estimate() {
        let p = provider();
        assert!((p.estimate_cost(60.0, None) - 0.006).abs() < 1e-9);
        assert!((p.estimate_cost(90.0, Some("whisper-1")) - 0.009).abs() < 1e-9);
    }
}
