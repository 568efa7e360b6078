//! Provider capability catalog.
//!
//! The catalog is the typed table of what each backend declares: limits,
//! formats, languages, features, performance profile and per-minute pricing.
//! It is loaded from `~/.scribe/catalog.json` when present and validated; any
//! parse or validation failure falls back to the compiled-in table.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

use scribe_common::config::config_dir;
use scribe_common::{DEEPGRAM, KNOWN_PROVIDERS, WHISPER};

use crate::provider::{Feature, ProviderCapabilities};

const MB: u64 = 1024 * 1024;

// ============================================================================
// Performance Profile
// ============================================================================

/// Declared throughput class of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedTier {
    Fast,
    Medium,
    Slow,
}

impl SpeedTier {
    pub const fn bonus(self) -> f64 {
        match self {
            Self::Fast => 10.0,
            Self::Medium => 5.0,
            Self::Slow => 0.0,
        }
    }
}

/// Static performance characteristics used by selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceProfile {
    /// Declared accuracy, 0-100
    pub accuracy: f64,
    pub speed: SpeedTier,
    /// Typical end-to-end latency in milliseconds
    pub typical_latency_ms: u64,
}

impl PerformanceProfile {
    /// Points lost per second of typical latency.
    pub const LATENCY_PENALTY_PER_SEC: f64 = 5.0;
    /// Upper bound on the latency penalty.
    pub const MAX_LATENCY_PENALTY: f64 = 20.0;

    /// `accuracy + speed_bonus - latency_penalty`.
    pub fn score(&self) -> f64 {
        let penalty = (self.typical_latency_ms as f64 / 1000.0 * Self::LATENCY_PENALTY_PER_SEC)
            .min(Self::MAX_LATENCY_PENALTY);
        self.accuracy + self.speed.bonus() - penalty
    }
}

// ============================================================================
// Pricing
// ============================================================================

/// Per-minute pricing table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    /// Model billed when the request names none (or an unknown one)
    pub default_model: String,
    /// USD per minute, by model
    pub per_minute: BTreeMap<String, f64>,
}

impl Pricing {
    /// Rate for a model, falling back to the default model's rate.
    pub fn rate(&self, model: Option<&str>) -> f64 {
        model
            .and_then(|m| self.per_minute.get(m))
            .or_else(|| self.per_minute.get(&self.default_model))
            .copied()
            .unwrap_or(0.0)
    }

    /// Cost in USD for `duration_secs` of audio.
    pub fn estimate(&self, duration_secs: f64, model: Option<&str>) -> f64 {
        duration_secs.max(0.0) / 60.0 * self.rate(model)
    }
}

/// Everything the catalog declares about one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSpec {
    pub capabilities: ProviderCapabilities,
    pub profile: PerformanceProfile,
    pub pricing: Pricing,
}

// ============================================================================
// Catalog
// ============================================================================

/// Catalog loading and validation errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Catalog is missing provider '{0}'")]
    MissingProvider(String),

    #[error("Invalid catalog entry for '{provider}': {reason}")]
    Invalid { provider: String, reason: String },
}

/// Typed capability table keyed by provider id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderCatalog {
    providers: BTreeMap<String, ProviderSpec>,
}

impl Default for ProviderCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProviderCatalog {
    /// Compiled-in table.
    pub fn builtin() -> Self {
        let mut providers = BTreeMap::new();
        providers.insert(WHISPER.to_string(), whisper_spec());
        providers.insert(DEEPGRAM.to_string(), deepgram_spec());
        Self { providers }
    }

    /// Parse and validate a JSON catalog.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let catalog: Self = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog file, falling back to the builtin table on any error.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No catalog file, using builtin catalog");
            return Self::builtin();
        }

        let loaded = std::fs::read_to_string(path)
            .map_err(CatalogError::from)
            .and_then(|json| Self::from_json(&json));

        match loaded {
            Ok(catalog) => {
                tracing::info!(path = %path.display(), "Loaded provider catalog");
                catalog
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Invalid provider catalog, using builtin catalog"
                );
                Self::builtin()
            }
        }
    }

    /// Load `catalog.json` from the settings directory.
    pub fn load_default() -> Self {
        Self::load(&config_dir().join("catalog.json"))
    }

    /// Every known provider must be present with sane values.
    pub fn validate(&self) -> Result<(), CatalogError> {
        for id in KNOWN_PROVIDERS {
            if !self.providers.contains_key(*id) {
                return Err(CatalogError::MissingProvider((*id).to_string()));
            }
        }

        for (id, spec) in &self.providers {
            let invalid = |reason: &str| CatalogError::Invalid {
                provider: id.clone(),
                reason: reason.to_string(),
            };

            if spec.capabilities.max_file_size == 0 {
                return Err(invalid("maxFileSize must be positive"));
            }
            if spec.capabilities.audio_formats.is_empty() {
                return Err(invalid("audioFormats must not be empty"));
            }
            if !(0.0..=100.0).contains(&spec.profile.accuracy) {
                return Err(invalid("accuracy must be within 0-100"));
            }
            if !spec.pricing.per_minute.contains_key(&spec.pricing.default_model) {
                return Err(invalid("defaultModel has no price"));
            }
            if spec.pricing.per_minute.values().any(|r| !r.is_finite() || *r < 0.0) {
                return Err(invalid("prices must be non-negative"));
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ProviderSpec> {
        self.providers.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn whisper_spec() -> ProviderSpec {
    ProviderSpec {
        capabilities: ProviderCapabilities {
            max_file_size: 25 * MB,
            audio_formats: set(&[
                "flac", "m4a", "mp3", "mp4", "mpeg", "mpga", "oga", "ogg", "wav", "webm",
            ]),
            languages: set(&[
                "af", "ar", "hy", "az", "be", "bs", "bg", "ca", "zh", "hr", "cs", "da", "nl",
                "en", "et", "fi", "fr", "gl", "de", "el", "he", "hi", "hu", "is", "id", "it",
                "ja", "kn", "kk", "ko", "lv", "lt", "mk", "ms", "mr", "mi", "ne", "no", "fa",
                "pl", "pt", "ro", "ru", "sr", "sk", "sl", "es", "sw", "sv", "tl", "ta", "th",
                "tr", "uk", "ur", "vi", "cy",
            ]),
            features: [
                Feature::Timestamps,
                Feature::Translation,
                Feature::LanguageDetection,
                Feature::Punctuation,
            ]
            .into_iter()
            .collect(),
            models: vec!["whisper-1".to_string()],
            streaming: false,
            real_time: false,
        },
        profile: PerformanceProfile {
            accuracy: 92.0,
            speed: SpeedTier::Medium,
            typical_latency_ms: 1500,
        },
        pricing: Pricing {
            default_model: "whisper-1".to_string(),
            per_minute: [("whisper-1".to_string(), 0.006)].into_iter().collect(),
        },
    }
}

fn deepgram_spec() -> ProviderSpec {
    ProviderSpec {
        capabilities: ProviderCapabilities {
            max_file_size: 2 * 1024 * MB,
            audio_formats: set(&[
                "mp3", "mp4", "mp2", "aac", "wav", "flac", "pcm", "m4a", "ogg", "opus", "webm",
            ]),
            languages: set(&[
                "bg", "ca", "zh", "cs", "da", "nl", "en", "et", "fi", "fr", "de", "el", "hi",
                "hu", "id", "it", "ja", "ko", "lv", "lt", "ms", "no", "pl", "pt", "ro", "ru",
                "sk", "es", "sv", "th", "tr", "uk", "vi",
            ]),
            features: [
                Feature::Timestamps,
                Feature::WordTimestamps,
                Feature::Diarization,
                Feature::Streaming,
                Feature::Punctuation,
                Feature::SmartFormat,
                Feature::LanguageDetection,
            ]
            .into_iter()
            .collect(),
            models: ["nova-2", "nova", "enhanced", "base"]
                .iter()
                .map(|m| (*m).to_string())
                .collect(),
            streaming: true,
            real_time: true,
        },
        profile: PerformanceProfile {
            accuracy: 90.0,
            speed: SpeedTier::Fast,
            typical_latency_ms: 300,
        },
        pricing: Pricing {
            default_model: "nova-2".to_string(),
            per_minute: [
                ("nova-2".to_string(), 0.0043),
                ("nova".to_string(), 0.0043),
                ("enhanced".to_string(), 0.0145),
                ("base".to_string(), 0.0125),
            ]
            .into_iter()
            .collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_builtin_is_valid() {
        ProviderCatalog::builtin().validate().unwrap();
    }

    #[test]
    fn test_builtin_limits() {
        let catalog = ProviderCatalog::builtin();
        assert_eq!(catalog.get(WHISPER).unwrap().capabilities.max_file_size, 25 * MB);
        assert_eq!(
            catalog.get(DEEPGRAM).unwrap().capabilities.max_file_size,
            2048 * MB
        );
        assert_eq!(catalog.ids().collect::<Vec<_>>(), vec!["deepgram", "whisper"]);
    }

    #[test]
    fn test_performance_scores() {
        let catalog = ProviderCatalog::builtin();
        let whisper = catalog.get(WHISPER).unwrap().profile.score();
        let deepgram = catalog.get(DEEPGRAM).unwrap().profile.score();
        assert!((whisper - 89.5).abs() < 1e-9);
        assert!((deepgram - 98.5).abs() < 1e-9);
    }

    #[test]
    fn test_latency_penalty_is_capped() {
        let profile = PerformanceProfile {
            accuracy: 80.0,
            speed: SpeedTier::Slow,
            typical_latency_ms: 60_000,
        };
        assert!((profile.score() - 60.0).abs() < 1e-9);
    }

    #[test_case(Some("nova-2"), 60.0, 0.0043)]
    #[test_case(Some("enhanced"), 60.0, 0.0145)]
    #[test_case(Some("unknown"), 60.0, 0.0043)]
    #[test_case(None, 120.0, 0.0086)]
    fn test_deepgram_pricing(model: Option<&str>, secs: f64, expected: f64) {
        let catalog = ProviderCatalog::builtin();
        let pricing = &catalog.get(DEEPGRAM).unwrap().pricing;
        assert!((pricing.estimate(secs, model) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_from_json_round_trip_of_builtin() {
        let json = serde_json::to_string(&ProviderCatalog::builtin()).unwrap();
        let parsed = ProviderCatalog::from_json(&json).unwrap();
        assert_eq!(parsed, ProviderCatalog::builtin());
    }

    #[test]
    fn test_from_json_rejects_missing_provider() {
        let mut catalog = ProviderCatalog::builtin();
        catalog.providers.remove(DEEPGRAM);
        let json = serde_json::to_string(&catalog).unwrap();
        assert!(matches!(
            ProviderCatalog::from_json(&json),
            Err(CatalogError::MissingProvider(ref id)) if id == "deepgram"
        ));
    }

    #[test]
    fn test_from_json_rejects_unpriced_default_model() {
        let mut catalog = ProviderCatalog::builtin();
        if let Some(spec) = catalog.providers.get_mut(WHISPER) {
            spec.pricing.default_model = "whisper-2".into();
        }
        let json = serde_json::to_string(&catalog).unwrap();
        assert!(matches!(
            ProviderCatalog::from_json(&json),
            Err(CatalogError::Invalid { .. })
        ));
    }

    #[test]
    fn test_load_falls_back_on_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, "{ \"whisper\": 12 }").unwrap();
        assert_eq!(ProviderCatalog::load(&path), ProviderCatalog::builtin());
    }

    #[test]
    fn test_load_reads_custom_limits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let mut catalog = ProviderCatalog::builtin();
        if let Some(spec) = catalog.providers.get_mut(WHISPER) {
            spec.capabilities.max_file_size = 10 * MB;
        }
        std::fs::write(&path, serde_json::to_string_pretty(&catalog).unwrap()).unwrap();

        let loaded = ProviderCatalog::load(&path);
        assert_eq!(loaded.get(WHISPER).unwrap().capabilities.max_file_size, 10 * MB);
    }
}
