//! Settings for the Scribe transcription layer.
//!
//! Settings live in a single JSON document at `~/.scribe/settings.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit settings file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `OPENAI_API_KEY` → whisper.apiKey
//! - `DEEPGRAM_API_KEY` → deepgram.apiKey
//! - `SCRIBE_SELECTION_STRATEGY` → selectionStrategy
//! - `SCRIBE_FALLBACK_ENABLED` → fallbackEnabled
//! - `SCRIBE_LOG_LEVEL` → logLevel

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result, ResultExt};

/// Provider id of the OpenAI Whisper backend.
pub const WHISPER: &str = "whisper";

/// Provider id of the Deepgram backend.
pub const DEEPGRAM: &str = "deepgram";

/// Every provider id the settings schema knows about.
pub const KNOWN_PROVIDERS: &[&str] = &[WHISPER, DEEPGRAM];

/// Value of [`Settings::provider`] that lets the selection strategy decide.
pub const AUTO: &str = "auto";

/// Get the settings directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".scribe"),
        |dirs| dirs.home_dir().join(".scribe"),
    )
}

/// Get the settings file path.
pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

// ============================================================================
// Selection Strategy
// ============================================================================

/// Policy used to choose a provider among the enabled candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Use the explicitly preferred (or default) provider only
    Manual,
    /// Cheapest provider for the expected duration
    #[serde(alias = "cost-optimized", alias = "cost")]
    CostOptimized,
    /// Best declared accuracy/speed/latency trade-off
    #[default]
    #[serde(alias = "performance-optimized", alias = "performance")]
    PerformanceOptimized,
    /// Highest declared accuracy
    #[serde(alias = "quality-optimized", alias = "quality")]
    QualityOptimized,
    /// Cycle through the enabled providers
    #[serde(alias = "round-robin")]
    RoundRobin,
    /// Deterministic bucket per caller key
    #[serde(alias = "ab-test", alias = "ab")]
    AbTest,
}

impl SelectionStrategy {
    /// Canonical configuration name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::CostOptimized => "cost_optimized",
            Self::PerformanceOptimized => "performance_optimized",
            Self::QualityOptimized => "quality_optimized",
            Self::RoundRobin => "round_robin",
            Self::AbTest => "ab_test",
        }
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "manual" => Ok(Self::Manual),
            "cost_optimized" | "cost" => Ok(Self::CostOptimized),
            "performance_optimized" | "performance" => Ok(Self::PerformanceOptimized),
            "quality_optimized" | "quality" => Ok(Self::QualityOptimized),
            "round_robin" => Ok(Self::RoundRobin),
            "ab_test" | "ab" => Ok(Self::AbTest),
            _ => Err(format!("Unknown selection strategy: {}", s)),
        }
    }
}

// ============================================================================
// Provider Settings
// ============================================================================

/// Per-provider enable flag, credentials and endpoint overrides.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    /// Whether the provider may be selected
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// API credential; providers without one are not initialized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default model for requests that do not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Endpoint override (self-hosted gateways, tests)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl ProviderSettings {
    /// Credential if present and non-blank.
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            model: None,
            base_url: None,
        }
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("enabled", &self.enabled)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// A/B test bucket configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbTestSettings {
    /// Bucket boundary in `[0, 1]`; keys hashing below it get variant A
    #[serde(default = "default_split")]
    pub split: f64,

    /// Variant A provider id (default: first enabled provider by id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_a: Option<String>,

    /// Variant B provider id (default: second enabled provider by id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_b: Option<String>,
}

impl Default for AbTestSettings {
    fn default() -> Self {
        Self {
            split: default_split(),
            variant_a: None,
            variant_b: None,
        }
    }
}

// ============================================================================
// Root Settings
// ============================================================================

/// Root settings document consumed by the provider factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// `"auto"` or a provider id pinned for every request
    #[serde(default = "default_provider_mode")]
    pub provider: String,

    /// Provider used by the manual strategy when no preference is given
    #[serde(default = "default_default_provider")]
    pub default_provider: String,

    /// Selection policy
    #[serde(default)]
    pub selection_strategy: SelectionStrategy,

    /// Substitute another provider when the chosen one is unavailable or fails
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,

    /// A/B test configuration
    #[serde(default)]
    pub ab_test: AbTestSettings,

    /// Per-adapter request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Log level used by hosts that install the default subscriber
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// OpenAI Whisper settings
    #[serde(default)]
    pub whisper: ProviderSettings,

    /// Deepgram settings
    #[serde(default)]
    pub deepgram: ProviderSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: default_provider_mode(),
            default_provider: default_default_provider(),
            selection_strategy: SelectionStrategy::default(),
            fallback_enabled: true,
            ab_test: AbTestSettings::default(),
            request_timeout_secs: default_request_timeout_secs(),
            log_level: default_log_level(),
            whisper: ProviderSettings::default(),
            deepgram: ProviderSettings::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_split() -> f64 {
    0.5
}

fn default_provider_mode() -> String {
    AUTO.into()
}

fn default_default_provider() -> String {
    WHISPER.into()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".into()
}

impl Settings {
    /// Load settings from the default path, falling back to defaults when absent.
    pub fn load() -> Result<Self> {
        let path = settings_path();
        if !path.exists() {
            tracing::info!("Settings file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load settings from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read settings from {}", path.display()))?;

        serde_json::from_str(&content)
            .context(format!("Failed to parse settings from {}", path.display()))
    }

    /// Load settings with environment variable overrides applied.
    pub fn load_with_env() -> Result<Self> {
        let mut settings = Self::load()?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Apply environment variable overrides to the settings.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.whisper.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("DEEPGRAM_API_KEY") {
            self.deepgram.api_key = Some(key);
        }

        if let Ok(strategy) = std::env::var("SCRIBE_SELECTION_STRATEGY") {
            match strategy.parse() {
                Ok(s) => self.selection_strategy = s,
                Err(e) => tracing::warn!(error = %e, "Ignoring SCRIBE_SELECTION_STRATEGY"),
            }
        }

        if let Ok(flag) = std::env::var("SCRIBE_FALLBACK_ENABLED") {
            if let Ok(enabled) = flag.parse() {
                self.fallback_enabled = enabled;
            }
        }

        if let Ok(level) = std::env::var("SCRIBE_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    /// Save settings to a specific path, creating the parent directory.
    ///
    /// The document is written to a sibling temp file and renamed into place
    /// so a crash never leaves a truncated settings file behind.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)
                    .context(format!("Failed to create settings directory {}", dir.display()))?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .context(format!("Failed to write settings to {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .context(format!("Failed to move settings into {}", path.display()))
    }

    /// Settings for a provider id.
    pub fn provider_settings(&self, id: &str) -> Option<&ProviderSettings> {
        match id {
            WHISPER => Some(&self.whisper),
            DEEPGRAM => Some(&self.deepgram),
            _ => None,
        }
    }

    /// Mutable settings for a provider id.
    pub fn provider_settings_mut(&mut self, id: &str) -> Result<&mut ProviderSettings> {
        match id {
            WHISPER => Ok(&mut self.whisper),
            DEEPGRAM => Ok(&mut self.deepgram),
            _ => Err(Error::UnknownProvider(id.to_string())),
        }
    }

    /// Whether a provider is switched on in settings.
    pub fn is_enabled(&self, id: &str) -> bool {
        self.provider_settings(id).is_some_and(|p| p.enabled)
    }

    /// Provider pinned by the `provider` field, or `None` in auto mode.
    pub fn pinned_provider(&self) -> Option<&str> {
        let mode = self.provider.trim();
        if mode.is_empty() || mode.eq_ignore_ascii_case(AUTO) {
            None
        } else {
            Some(mode)
        }
    }

    /// Enable or disable a provider.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<()> {
        self.provider_settings_mut(id)?.enabled = enabled;
        Ok(())
    }

    /// Change the default provider.
    pub fn set_default_provider(&mut self, id: &str) -> Result<()> {
        if self.provider_settings(id).is_none() {
            return Err(Error::UnknownProvider(id.to_string()));
        }
        self.default_provider = id.to_string();
        Ok(())
    }
}
