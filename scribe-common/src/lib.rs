//! Scribe Common - Shared settings, errors and logging for the Scribe transcription layer.
//!
//! This crate provides:
//! - Settings types, loading and environment overrides
//! - Settings validation
//! - Settings persistence collaborators
//! - Error types and handling utilities
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod store;
pub mod validation;

pub use config::{
    AbTestSettings, ProviderSettings, SelectionStrategy, Settings, AUTO, DEEPGRAM,
    KNOWN_PROVIDERS, WHISPER,
};
pub use error::{Error, Result};
pub use store::{JsonFileStore, MemoryStore, SettingsStore};
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::{SelectionStrategy, Settings};
    pub use crate::error::{Error, Result};
    pub use crate::logging::init_logging;
    pub use crate::store::SettingsStore;
    pub use crate::validation::{Validate, ValidationError};
}
