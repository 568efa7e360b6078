#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use scribe_common::logging::init_logging;
use scribe_common::{JsonFileStore, SelectionStrategy, SettingsStore, KNOWN_PROVIDERS};
use scribe_stt::{
    DeepgramOptions, ProviderCatalog, ProviderFactory, ProviderOptions, ResponseDetail,
    TranscriptionRequest, WhisperOptions,
};

/// `scribe` - transcribe audio through Whisper or Deepgram with automatic
/// provider selection and fallback.
#[derive(Parser, Debug)]
#[command(name = "scribe")]
#[command(version = "0.1.0")]
#[command(about = "Speech-to-text with provider selection and fallback.", long_about = None)]
struct Cli {
    /// Settings file (default: ~/.scribe/settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format (pretty, json)
    #[arg(long, global = true, default_value = "pretty")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Transcribe an audio file
    Transcribe {
        /// Audio file; its extension is the audio format
        file: PathBuf,

        /// Preferred provider (whisper, deepgram)
        #[arg(short, long)]
        provider: Option<String>,

        /// ISO 639-1 language code or "auto"
        #[arg(short, long, default_value = "auto")]
        language: String,

        /// Model to request
        #[arg(long)]
        model: Option<String>,

        /// Return timestamped segments
        #[arg(long)]
        segments: bool,

        /// Label speakers (Deepgram)
        #[arg(long, conflicts_with = "translate")]
        diarize: bool,

        /// Translate to English (Whisper)
        #[arg(long)]
        translate: bool,

        /// Known audio duration in seconds, used for cost-optimized selection
        #[arg(long)]
        duration: Option<f64>,

        /// Stable selection key (user or session id) for A/B tests
        #[arg(long)]
        key: Option<String>,
    },

    /// List providers and their status
    Providers,

    /// Estimate the cost of transcribing audio
    Cost {
        /// Provider id
        provider: String,

        /// Audio duration in seconds
        seconds: f64,

        /// Model to price (default: provider's default model)
        #[arg(long)]
        model: Option<String>,
    },

    /// Enable a provider
    Enable { provider: String },

    /// Disable a provider
    Disable { provider: String },

    /// Set the default provider used by the manual strategy
    Default { provider: String },

    /// Set the selection strategy (manual, cost_optimized, performance_optimized,
    /// quality_optimized, round_robin, ab_test)
    Strategy { strategy: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let store: Arc<dyn SettingsStore> = Arc::new(match cli.config {
        Some(ref path) => JsonFileStore::new(path),
        None => JsonFileStore::default(),
    });

    let mut settings = store.load().context("Failed to load settings")?;

    // Credentials from the environment are used for calls but never written back.
    let persists_settings = matches!(
        cli.command,
        Commands::Enable { .. }
            | Commands::Disable { .. }
            | Commands::Default { .. }
            | Commands::Strategy { .. }
    );
    if !persists_settings {
        settings.apply_env_overrides();
    }

    init_logging(&settings.log_level, &cli.log_format);

    let factory = ProviderFactory::new(settings, ProviderCatalog::load_default(), store);

    match cli.command {
        Commands::Transcribe {
            file,
            provider,
            language,
            model,
            segments,
            diarize,
            translate,
            duration,
            key,
        } => {
            let mut request = read_request(&file).await?.with_language(&language);
            if let Some(model) = model {
                request = request.with_model(model);
            }
            if segments {
                request = request.with_detail(ResponseDetail::Segmented);
            }
            if diarize {
                request = request.with_options(ProviderOptions::Deepgram(DeepgramOptions {
                    diarize: true,
                    ..Default::default()
                }));
            } else if translate {
                request = request.with_options(ProviderOptions::Whisper(WhisperOptions {
                    translate: true,
                    ..Default::default()
                }));
            }
            if let Some(duration) = duration {
                request = request.with_duration(duration);
            }
            if let Some(key) = key {
                request = request.with_selection_key(key);
            }

            let result = factory.transcribe(&request, provider.as_deref()).await?;
            print_json(&serde_json::to_value(&result)?)
        }

        Commands::Providers => {
            let settings = factory.settings().await;
            let available = factory.available_providers().await;
            let registered = factory.registered_providers().await;

            let mut rows = Vec::new();
            for id in KNOWN_PROVIDERS {
                let caps = factory.capabilities(id).await;
                rows.push(json!({
                    "id": id,
                    "enabled": settings.is_enabled(id),
                    "configured": registered.iter().any(|r| r == id),
                    "available": available.iter().any(|a| a == id),
                    "default": settings.default_provider == *id,
                    "maxFileSizeMb": caps.as_ref().map(|c| c.max_file_size / (1024 * 1024)),
                    "streaming": caps.as_ref().map(|c| c.streaming),
                    "metrics": factory.metrics(id).await,
                }));
            }

            print_json(&json!({
                "strategy": settings.selection_strategy,
                "fallbackEnabled": settings.fallback_enabled,
                "providers": rows,
            }))
        }

        Commands::Cost {
            provider,
            seconds,
            model,
        } => {
            if !seconds.is_finite() || seconds < 0.0 {
                bail!("Duration must be a non-negative number of seconds");
            }
            let cost = factory
                .estimate_cost(&provider, seconds, model.as_deref())
                .await?;
            print_json(&json!({
                "provider": provider,
                "seconds": seconds,
                "model": model,
                "costUsd": cost,
            }))
        }

        Commands::Enable { provider } => {
            factory.toggle_provider(&provider, true).await?;
            info!(provider = %provider, "Provider enabled");
            Ok(())
        }

        Commands::Disable { provider } => {
            factory.toggle_provider(&provider, false).await?;
            info!(provider = %provider, "Provider disabled");
            Ok(())
        }

        Commands::Default { provider } => {
            factory.set_default_provider(&provider).await?;
            info!(provider = %provider, "Default provider set");
            Ok(())
        }

        Commands::Strategy { strategy } => {
            let strategy: SelectionStrategy = strategy.parse().map_err(anyhow::Error::msg)?;
            factory.set_strategy(strategy).await?;
            info!(strategy = %strategy, "Selection strategy set");
            Ok(())
        }
    }
}

async fn read_request(file: &Path) -> Result<TranscriptionRequest> {
    let Some(format) = file.extension().and_then(|e| e.to_str()) else {
        bail!("Cannot infer audio format from {}", file.display());
    };
    let audio = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    if audio.is_empty() {
        bail!("{} is empty", file.display());
    }
    Ok(TranscriptionRequest::new(audio, format))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
