//! Provider factory: registry, selection, validation, dispatch and fallback.
//!
//! The factory is the single entry point hosts call. It is constructed
//! explicitly and shared by `Arc`; every `transcribe` call is independent and
//! no lock is held across a provider's network call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use scribe_common::logging::generate_request_id;
use scribe_common::{SelectionStrategy, Settings, SettingsStore, Validate, KNOWN_PROVIDERS};

use crate::catalog::ProviderCatalog;
use crate::error::{Error, Result};
use crate::events::{EventNotifier, TranscriptionEvent};
use crate::metrics::{MetricsRecorder, ProviderMetrics, RequestOutcome};
use crate::provider::{
    create_provider, ProviderCapabilities, ProviderError, TranscriptionProvider,
    TranscriptionRequest, TranscriptionResult,
};
use crate::selection::{Candidate, SelectionContext, SelectionEngine, NOMINAL_DURATION_SECS};
use crate::validator::validate_request;

type Registry = HashMap<String, Arc<dyn TranscriptionProvider>>;

/// Orchestrates provider selection and fallback for transcription requests.
pub struct ProviderFactory {
    catalog: ProviderCatalog,
    registry: RwLock<Registry>,
    settings: RwLock<Settings>,
    update_lock: Mutex<()>,
    store: Arc<dyn SettingsStore>,
    metrics: MetricsRecorder,
    engine: SelectionEngine,
    notifier: EventNotifier,
}

impl ProviderFactory {
    /// Build adapters for every enabled provider that has credentials.
    ///
    /// Providers without credentials are skipped, so the factory works with a
    /// single configured backend (or none, failing only at selection time).
    pub fn new(settings: Settings, catalog: ProviderCatalog, store: Arc<dyn SettingsStore>) -> Self {
        if let Err(e) = settings.validate() {
            warn!(error = %e, "Settings failed validation");
        }

        let timeout = Duration::from_secs(settings.request_timeout_secs.max(1));
        let mut registry = Registry::new();

        for id in KNOWN_PROVIDERS {
            if !settings.is_enabled(id) {
                debug!(provider = %id, "Provider disabled, not initialized");
                continue;
            }
            match build_adapter(id, &settings, &catalog, timeout) {
                Ok(adapter) => {
                    registry.insert((*id).to_string(), adapter);
                }
                Err(Error::MissingCredentials(_)) => {
                    info!(provider = %id, "No credentials configured, provider not initialized");
                }
                Err(e) => {
                    warn!(provider = %id, error = %e, "Failed to initialize provider");
                }
            }
        }

        let mut initialized: Vec<&String> = registry.keys().collect();
        initialized.sort();
        info!(providers = ?initialized, "Initialized transcription providers");

        Self::assemble(settings, catalog, registry, store)
    }

    /// Build a factory around pre-constructed adapters, keyed by their names.
    pub fn with_providers(
        settings: Settings,
        providers: Vec<Arc<dyn TranscriptionProvider>>,
        store: Arc<dyn SettingsStore>,
    ) -> Self {
        let registry = providers
            .into_iter()
            .map(|p| (p.name().to_string(), p))
            .collect();
        Self::assemble(settings, ProviderCatalog::builtin(), registry, store)
    }

    fn assemble(
        settings: Settings,
        catalog: ProviderCatalog,
        registry: Registry,
        store: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            catalog,
            registry: RwLock::new(registry),
            settings: RwLock::new(settings),
            update_lock: Mutex::new(()),
            store,
            metrics: MetricsRecorder::new(),
            engine: SelectionEngine::new(),
            notifier: EventNotifier::disabled(),
        }
    }

    /// Attach a lifecycle event sink.
    pub fn with_notifier(mut self, notifier: EventNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Providers that are both registered and currently enabled, sorted.
    pub async fn available_providers(&self) -> Vec<String> {
        let settings = self.settings.read().await;
        let registry = self.registry.read().await;
        let mut ids: Vec<String> = registry
            .keys()
            .filter(|id| settings.is_enabled(id))
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Providers with an adapter, whether enabled or not, sorted.
    pub async fn registered_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.registry.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Current settings snapshot.
    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Declared capabilities of a provider, registered or not.
    pub async fn capabilities(&self, id: &str) -> Option<ProviderCapabilities> {
        if let Some(adapter) = self.adapter(id).await {
            return Some(adapter.capabilities().clone());
        }
        self.catalog.get(id).map(|spec| spec.capabilities.clone())
    }

    /// Estimated cost in USD; no network call.
    ///
    /// `id` is a provider id, or a `<provider>-<model>` id such as
    /// `deepgram-nova-2` whose model applies when `model` is `None`.
    pub async fn estimate_cost(&self, id: &str, duration_secs: f64, model: Option<&str>) -> Result<f64> {
        let (id, model) = match split_model_id(id) {
            Some((provider, suffix)) => (provider, model.or(Some(suffix))),
            None => (id, model),
        };
        if let Some(adapter) = self.adapter(id).await {
            return Ok(adapter.estimate_cost(duration_secs, model));
        }
        self.catalog
            .get(id)
            .map(|spec| spec.pricing.estimate(duration_secs, model))
            .ok_or_else(|| Error::UnknownProvider(id.to_string()))
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Run selection and return the chosen adapter.
    ///
    /// An unavailable `preferred` provider is replaced by the next best one
    /// when fallback is enabled; otherwise this fails.
    pub async fn get_provider(&self, preferred: Option<&str>) -> Result<Arc<dyn TranscriptionProvider>> {
        let ctx = self
            .selection_context(preferred, NOMINAL_DURATION_SECS, None, None)
            .await;
        let selection = self.engine.select(&ctx)?;
        self.adapter(&selection.provider)
            .await
            .ok_or_else(|| Error::UnknownProvider(selection.provider.clone()))
    }

    async fn adapter(&self, id: &str) -> Option<Arc<dyn TranscriptionProvider>> {
        self.registry.read().await.get(id).cloned()
    }

    async fn selection_context(
        &self,
        preferred: Option<&str>,
        duration_secs: f64,
        model: Option<&str>,
        key: Option<&str>,
    ) -> SelectionContext {
        let settings = self.settings.read().await.clone();
        let latencies = self.metrics.average_latencies().await;

        let candidates = {
            let registry = self.registry.read().await;
            registry
                .iter()
                .filter(|(id, _)| settings.is_enabled(id))
                .map(|(id, adapter)| Candidate {
                    id: id.clone(),
                    profile: adapter.profile().clone(),
                    cost: adapter.estimate_cost(duration_secs, model),
                    average_latency_ms: latencies.get(id).copied(),
                })
                .collect()
        };

        let preferred = preferred
            .map(str::to_string)
            .or_else(|| settings.pinned_provider().map(str::to_string))
            .or_else(|| {
                (settings.selection_strategy == SelectionStrategy::Manual)
                    .then(|| settings.default_provider.clone())
            });

        SelectionContext {
            candidates,
            preferred,
            strategy: settings.selection_strategy,
            fallback_enabled: settings.fallback_enabled,
            key: key.map(str::to_string),
            ab_test: settings.ab_test,
        }
    }

    // ========================================================================
    // Transcription
    // ========================================================================

    /// Transcribe a request, falling back once on a retryable failure.
    pub async fn transcribe(
        &self,
        request: &TranscriptionRequest,
        preferred: Option<&str>,
    ) -> Result<TranscriptionResult> {
        let request_id = generate_request_id();
        let duration = request.duration_secs().unwrap_or(NOMINAL_DURATION_SECS);
        let ctx = self
            .selection_context(preferred, duration, request.model(), request.selection_key())
            .await;

        let selection = self.engine.select(&ctx)?;
        if let Some(ref unavailable) = selection.substituted_for {
            self.notifier.notify(TranscriptionEvent::ProviderSubstituted {
                request_id: request_id.clone(),
                preferred: unavailable.clone(),
                provider: selection.provider.clone(),
                at: Utc::now(),
            });
        }

        let provider = self
            .adapter(&selection.provider)
            .await
            .ok_or_else(|| Error::UnknownProvider(selection.provider.clone()))?;

        let report = validate_request(request, provider.capabilities());
        for warning in &report.warnings {
            debug!(request_id = %request_id, provider = %selection.provider, warning = %warning, "Validation warning");
        }
        if let Some(kind) = report.rejection_kind() {
            warn!(
                request_id = %request_id,
                provider = %selection.provider,
                errors = ?report.errors,
                "Request rejected before dispatch"
            );
            return Err(Error::Rejected {
                provider: selection.provider,
                kind,
                errors: report.errors,
            });
        }

        let err = match self.dispatch(&request_id, provider.as_ref(), request).await {
            Ok(result) => return Ok(result),
            Err(err) => err,
        };

        if !err.retryable || !ctx.fallback_enabled {
            return Err(err.into());
        }

        // Only providers that would accept this request are fallback targets.
        let fallback_ctx = SelectionContext {
            candidates: self.accepting_candidates(&ctx, request).await,
            ..ctx
        };
        let Some(next) = self.engine.next_best(&fallback_ctx, &selection.provider) else {
            debug!(request_id = %request_id, "No fallback provider available");
            return Err(err.into());
        };
        let Some(fallback) = self.adapter(&next).await else {
            return Err(err.into());
        };

        warn!(
            request_id = %request_id,
            from = %selection.provider,
            provider = %next,
            error = %err,
            "Switching to fallback provider"
        );
        self.notifier.notify(TranscriptionEvent::FallbackTriggered {
            request_id: request_id.clone(),
            from: selection.provider.clone(),
            to: next.clone(),
            kind: err.kind,
            at: Utc::now(),
        });

        self.dispatch(&request_id, fallback.as_ref(), request)
            .await
            .map_err(Error::from)
    }

    async fn accepting_candidates(
        &self,
        ctx: &SelectionContext,
        request: &TranscriptionRequest,
    ) -> Vec<Candidate> {
        let registry = self.registry.read().await;
        ctx.candidates
            .iter()
            .filter(|c| {
                registry
                    .get(&c.id)
                    .is_some_and(|a| validate_request(request, a.capabilities()).valid)
            })
            .cloned()
            .collect()
    }

    /// Call one adapter and record the outcome.
    async fn dispatch(
        &self,
        request_id: &str,
        provider: &dyn TranscriptionProvider,
        request: &TranscriptionRequest,
    ) -> std::result::Result<TranscriptionResult, ProviderError> {
        let name = provider.name().to_string();
        debug!(request_id = %request_id, provider = %name, "Dispatching transcription");
        self.notifier.notify(TranscriptionEvent::Started {
            request_id: request_id.to_string(),
            provider: name.clone(),
            at: Utc::now(),
        });

        let started = Instant::now();
        let outcome = provider.transcribe(request).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(result) => {
                let mut recorded = RequestOutcome::success(latency_ms);
                if let Some(duration) = result.duration_secs.or(request.duration_secs()) {
                    recorded = recorded
                        .with_cost(provider.estimate_cost(duration, Some(result.model.as_str())));
                }
                self.metrics.record(&name, recorded).await;

                info!(
                    request_id = %request_id,
                    provider = %name,
                    latency_ms = latency_ms as u64,
                    "Transcription completed"
                );
                self.notifier.notify(TranscriptionEvent::Completed {
                    request_id: request_id.to_string(),
                    provider: name,
                    processing_time_ms: result.processing_time_ms,
                    at: Utc::now(),
                });
                Ok(result)
            }
            Err(err) => {
                self.metrics
                    .record(&name, RequestOutcome::failure(err.to_string()))
                    .await;

                warn!(
                    request_id = %request_id,
                    provider = %name,
                    kind = %err.kind,
                    retryable = err.retryable,
                    error = %err.message,
                    "Transcription failed"
                );
                self.notifier.notify(TranscriptionEvent::Failed {
                    request_id: request_id.to_string(),
                    provider: name,
                    kind: err.kind,
                    message: err.message.clone(),
                    at: Utc::now(),
                });
                Err(err)
            }
        }
    }

    /// Abort in-flight requests on one provider, or on all of them.
    pub async fn cancel(&self, id: Option<&str>) -> Result<()> {
        let registry = self.registry.read().await;
        match id {
            Some(id) => {
                let adapter = registry
                    .get(id)
                    .ok_or_else(|| Error::UnknownProvider(id.to_string()))?;
                adapter.cancel();
            }
            None => registry.values().for_each(|adapter| adapter.cancel()),
        }
        Ok(())
    }

    // ========================================================================
    // Settings Mutation
    // ========================================================================

    /// Enable or disable a provider; takes effect on the next call.
    pub async fn toggle_provider(&self, id: &str, enabled: bool) -> Result<()> {
        let settings = self.update_settings(|s| s.set_enabled(id, enabled)).await?;
        info!(provider = %id, enabled, "Provider enabled status changed");

        if enabled {
            self.ensure_registered(id, &settings).await;
        }
        Ok(())
    }

    /// Change the provider used by the manual strategy.
    pub async fn set_default_provider(&self, id: &str) -> Result<()> {
        self.update_settings(|s| s.set_default_provider(id)).await?;
        info!(provider = %id, "Default provider changed");
        Ok(())
    }

    /// Change the selection strategy.
    pub async fn set_strategy(&self, strategy: SelectionStrategy) -> Result<()> {
        self.update_settings(|s| {
            s.selection_strategy = strategy;
            Ok(())
        })
        .await?;
        info!(strategy = %strategy, "Selection strategy changed");
        Ok(())
    }

    /// Apply a mutation to a copy of the settings, persist it, then swap it in.
    ///
    /// Writers are serialized by `update_lock`; the settings lock is only held
    /// for the final swap, so readers never wait on the store.
    async fn update_settings<F>(&self, mutate: F) -> Result<Settings>
    where
        F: FnOnce(&mut Settings) -> scribe_common::Result<()>,
    {
        let _writer = self.update_lock.lock().await;
        let mut next = self.settings.read().await.clone();
        mutate(&mut next).map_err(settings_error)?;

        let store = Arc::clone(&self.store);
        let snapshot = next.clone();
        tokio::task::spawn_blocking(move || store.save(&snapshot))
            .await
            .map_err(|e| {
                Error::Settings(scribe_common::Error::Config(format!(
                    "Settings save task failed: {e}"
                )))
            })?
            .map_err(settings_error)?;

        *self.settings.write().await = next.clone();
        Ok(next)
    }

    /// Create an adapter for a newly enabled provider if it has credentials.
    async fn ensure_registered(&self, id: &str, settings: &Settings) {
        let mut registry = self.registry.write().await;
        if registry.contains_key(id) {
            return;
        }

        let timeout = Duration::from_secs(settings.request_timeout_secs.max(1));
        match build_adapter(id, settings, &self.catalog, timeout) {
            Ok(adapter) => {
                registry.insert(id.to_string(), adapter);
                info!(provider = %id, "Initialized provider");
            }
            Err(e) => warn!(provider = %id, error = %e, "Enabled provider could not be initialized"),
        }
    }

    // ========================================================================
    // Metrics
    // ========================================================================

    /// Record an outcome observed outside `transcribe`.
    pub async fn record_metrics(&self, id: &str, outcome: RequestOutcome) {
        self.metrics.record(id, outcome).await;
    }

    pub async fn metrics(&self, id: &str) -> Option<ProviderMetrics> {
        self.metrics.get(id).await
    }

    pub async fn all_metrics(&self) -> HashMap<String, ProviderMetrics> {
        self.metrics.all().await
    }

    pub async fn reset_metrics(&self, id: Option<&str>) {
        self.metrics.reset(id).await;
    }
}

fn build_adapter(
    id: &str,
    settings: &Settings,
    catalog: &ProviderCatalog,
    timeout: Duration,
) -> Result<Arc<dyn TranscriptionProvider>> {
    let provider_settings = settings
        .provider_settings(id)
        .ok_or_else(|| Error::UnknownProvider(id.to_string()))?;
    let spec = catalog
        .get(id)
        .cloned()
        .ok_or_else(|| Error::UnknownProvider(id.to_string()))?;
    create_provider(id, provider_settings, spec, timeout)
}

/// Split a `<provider>-<model>` id into its known provider and model.
fn split_model_id(id: &str) -> Option<(&str, &str)> {
    KNOWN_PROVIDERS.iter().find_map(|provider| {
        id.strip_prefix(provider)?
            .strip_prefix('-')
            .filter(|model| !model.is_empty())
            .map(|model| (*provider, model))
    })
}

fn settings_error(err: scribe_common::Error) -> Error {
    match err {
        scribe_common::Error::UnknownProvider(id) => Error::UnknownProvider(id),
        other => Error::Settings(other),
    }
}
