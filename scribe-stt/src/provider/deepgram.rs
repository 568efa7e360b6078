//! Deepgram pre-recorded audio adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};

use scribe_common::DEEPGRAM;

use super::error::ProviderError;
use super::transport::{self, CancelHandle, DEFAULT_TIMEOUT};
use super::{
    DeepgramOptions, ProviderCapabilities, ResponseDetail, Segment, TranscriptionProvider,
    TranscriptionRequest, TranscriptionResult,
};
use crate::catalog::{PerformanceProfile, ProviderSpec};

const DEFAULT_BASE_URL: &str = "https://api.deepgram.com";

/// Deepgram `/v1/listen` provider.
pub struct DeepgramProvider {
    api_key: String,
    client: Client,
    base_url: String,
    model: String,
    spec: ProviderSpec,
    timeout: Duration,
    cancel: CancelHandle,
}

#[derive(Debug, Deserialize)]
struct ListenResponse {
    #[serde(default)]
    metadata: Option<Metadata>,
    results: Results,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Results {
    #[serde(default)]
    channels: Vec<Channel>,
    #[serde(default)]
    utterances: Option<Vec<Utterance>>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(default)]
    detected_language: Option<String>,
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    words: Vec<Word>,
}

#[derive(Debug, Deserialize)]
struct Word {
    word: String,
    start: f64,
    end: f64,
    #[serde(default)]
    speaker: Option<u32>,
    #[serde(default)]
    punctuated_word: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Utterance {
    start: f64,
    end: f64,
    transcript: String,
    #[serde(default)]
    speaker: Option<u32>,
}

impl DeepgramProvider {
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

    fn query(&self, request: &TranscriptionRequest, model: &str) -> Vec<(&'static str, String)> {
        let defaults = DeepgramOptions::default();
        let opts = request.options().deepgram().unwrap_or(&defaults);

        let mut query = vec![
            ("model", model.to_string()),
            ("punctuate", opts.punctuate.to_string()),
            ("smart_format", opts.smart_format.to_string()),
        ];

        match request.explicit_language() {
            Some(language) => query.push(("language", language.to_string())),
            None => query.push(("detect_language", "true".to_string())),
        }

        if opts.diarize {
            query.push(("diarize", "true".to_string()));
        }
        if opts.diarize || request.detail() == ResponseDetail::Segmented {
            query.push(("utterances", "true".to_string()));
        }
        for keyword in &opts.keywords {
            query.push(("keywords", keyword.clone()));
        }
        query
    }

    async fn send(
        &self,
        request: &TranscriptionRequest,
        model: &str,
    ) -> Result<ListenResponse, ProviderError> {
        let url = format!("{}/v1/listen", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", transport::mime_type(request.format()))
            .query(&self.query(request, model))
            .body(request.audio().to_vec())
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(DEEPGRAM, &e))?;

        let response = transport::check_status(DEEPGRAM, response).await?;
        response
            .json::<ListenResponse>()
            .await
            .map_err(|e| ProviderError::from_reqwest(DEEPGRAM, &e))
    }
}

#[async_trait]
impl TranscriptionProvider for DeepgramProvider {
    fn name(&self) -> &str {
        DEEPGRAM
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
            "Sending Deepgram request"
        );

        let body =
            transport::guarded(DEEPGRAM, self.timeout, &token, self.send(request, &model)).await?;

        let wants_segments =
            request.detail() == ResponseDetail::Segmented || request.options().wants_diarization();

        Ok(normalize(body, request, model, wants_segments, started))
    }

    fn estimate_cost(&self, duration_secs: f64, model: Option<&str>) -> f64 {
        self.spec.pricing.estimate(duration_secs, model)
    }

    fn cancel(&self) {
        tracing::debug!("Cancelling in-flight Deepgram requests");
        self.cancel.cancel();
    }
}

fn normalize(
    body: ListenResponse,
    request: &TranscriptionRequest,
    model: String,
    wants_segments: bool,
    started: Instant,
) -> TranscriptionResult {
    let ListenResponse { metadata, results } = body;
    let channel = results.channels.into_iter().next();

    let language = channel
        .as_ref()
        .and_then(|c| c.detected_language.clone())
        .or_else(|| request.explicit_language().map(str::to_string));

    let alternative = channel.and_then(|c| c.alternatives.into_iter().next());
    let text = alternative
        .as_ref()
        .map(|a| a.transcript.trim().to_string())
        .unwrap_or_default();

    let segments = if wants_segments {
        Some(match results.utterances {
            Some(utterances) if !utterances.is_empty() => utterances
                .into_iter()
                .map(|u| Segment {
                    start: u.start,
                    end: u.end,
                    text: u.transcript.trim().to_string(),
                    speaker: u.speaker.map(speaker_label),
                })
                .collect(),
            _ => alternative.map(|a| segments_from_words(a.words)).unwrap_or_default(),
        })
    } else {
        None
    };

    TranscriptionResult {
        text,
        language,
        duration_secs: metadata.and_then(|m| m.duration),
        segments,
        provider: DEEPGRAM.to_string(),
        model,
        processing_time_ms: started.elapsed().as_millis() as u64,
    }
}

fn speaker_label(speaker: u32) -> String {
    format!("speaker_{speaker}")
}

/// Group consecutive words by speaker into segments.
fn segments_from_words(words: Vec<Word>) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();

    for word in words {
        let text = word.punctuated_word.unwrap_or(word.word);
        let speaker = word.speaker.map(speaker_label);

        match segments.last_mut() {
            Some(last) if last.speaker == speaker => {
                last.end = word.end;
                last.text.push(' ');
                last.text.push_str(&text);
            }
            _ => segments.push(Segment {
                start: word.start,
                end: word.end,
                text,
                speaker,
            }),
        }
    }
    segments
}
