//! Scribe STT - Speech-to-text provider abstraction, selection and fallback.
//!
//! # Architecture
//!
//! ```text
//! caller ──► ProviderFactory::transcribe
//!              │
//!              ├─► SelectionEngine   (manual / cost / performance / quality / round-robin / A-B)
//!              ├─► validator         (format, size, language, features)
//!              ├─► TranscriptionProvider (Whisper, Deepgram)
//!              ├─► MetricsRecorder   (counts, latency, last error, cost)
//!              └─► EventNotifier     (optional lifecycle events)
//! ```
//!
//! A retryable failure (rate limit, network, 5xx) is retried once on the next
//! best provider when fallback is enabled. Nothing else is retried.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod catalog;
pub mod error;
pub mod events;
pub mod factory;
pub mod metrics;
pub mod provider;
pub mod selection;
pub mod validator;

pub use catalog::{CatalogError, PerformanceProfile, Pricing, ProviderCatalog, ProviderSpec, SpeedTier};
pub use error::{Error, Result};
pub use events::{EventNotifier, TranscriptionEvent};
pub use factory::ProviderFactory;
pub use metrics::{MetricsRecorder, ProviderMetrics, RequestOutcome};
pub use provider::{
    create_provider, DeepgramOptions, DeepgramProvider, ErrorKind, Feature, ProviderCapabilities,
    ProviderError, ProviderOptions, ResponseDetail, Segment, TranscriptionProvider,
    TranscriptionRequest, TranscriptionResult, WhisperOptions, WhisperProvider,
};
pub use selection::{Candidate, SelectionContext, SelectionEngine, SelectionError};
pub use validator::{validate, validate_request, ValidationReport};
