//! Shared mock providers for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use scribe_common::{MemoryStore, SelectionStrategy, Settings};
use scribe_stt::{
    ErrorKind, PerformanceProfile, ProviderCapabilities, ProviderCatalog, ProviderError,
    ProviderFactory, ProviderSpec, TranscriptionProvider, TranscriptionRequest,
    TranscriptionResult,
};

pub const MB: usize = 1024 * 1024;

/// What a mock provider does when called.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Succeed,
    Fail(ErrorKind),
    /// Succeed after sleeping
    Slow(Duration),
}

/// Provider with builtin capabilities and scripted behavior.
pub struct MockProvider {
    name: &'static str,
    spec: ProviderSpec,
    behavior: Behavior,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
        let spec = ProviderCatalog::builtin()
            .get(name)
            .cloned()
            .expect("builtin provider");
        Arc::new(Self {
            name,
            spec,
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptionProvider for MockProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.spec.capabilities
    }

    fn profile(&self) -> &PerformanceProfile {
        &self.spec.profile
    }

    async fn transcribe(
        &self,
        _request: &TranscriptionRequest,
    ) -> Result<TranscriptionResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Fail(kind) => Err(ProviderError::new(self.name, kind, "mock failure")),
            Behavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(self.result())
            }
            Behavior::Succeed => Ok(self.result()),
        }
    }

    fn estimate_cost(&self, duration_secs: f64, model: Option<&str>) -> f64 {
        self.spec.pricing.estimate(duration_secs, model)
    }

    fn cancel(&self) {}
}

impl MockProvider {
    fn result(&self) -> TranscriptionResult {
        TranscriptionResult {
            text: format!("transcribed by {}", self.name),
            language: Some("en".into()),
            duration_secs: Some(60.0),
            segments: None,
            provider: self.name.to_string(),
            model: self.spec.pricing.default_model.clone(),
            processing_time_ms: 5,
        }
    }
}

pub fn settings(strategy: SelectionStrategy, fallback_enabled: bool) -> Settings {
    Settings {
        selection_strategy: strategy,
        fallback_enabled,
        ..Settings::default()
    }
}

/// Factory over two mocks plus the store it persists to.
pub fn factory(
    settings: Settings,
    whisper: &Arc<MockProvider>,
    deepgram: &Arc<MockProvider>,
) -> (ProviderFactory, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new(settings.clone()));
    let providers: Vec<Arc<dyn TranscriptionProvider>> = vec![
        whisper.clone() as Arc<dyn TranscriptionProvider>,
        deepgram.clone() as Arc<dyn TranscriptionProvider>,
    ];
    let factory = ProviderFactory::with_providers(settings, providers, store.clone());
    (factory, store)
}

pub fn request(bytes: usize, format: &str) -> TranscriptionRequest {
    TranscriptionRequest::new(vec![0u8; bytes], format)
}
