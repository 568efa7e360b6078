//! Settings persistence collaborators.
//!
//! The provider factory never decides where settings live; it hands every
//! mutated snapshot to a [`SettingsStore`] supplied by the host.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::config::{settings_path, Settings};
use crate::error::{Error, Result};

/// Persists settings snapshots on behalf of the host.
pub trait SettingsStore: Send + Sync {
    /// Load the stored settings, or defaults when nothing is stored yet.
    fn load(&self) -> Result<Settings>;

    /// Persist a settings snapshot.
    fn save(&self, settings: &Settings) -> Result<()>;
}

/// Stores settings as a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Store backed by a specific file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl Default for JsonFileStore {
    fn default() -> Self {
        Self::new(settings_path())
    }
}

impl SettingsStore for JsonFileStore {
    fn load(&self) -> Result<Settings> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }
        Settings::load_from(&self.path)
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        settings.save_to(&self.path)?;
        tracing::debug!(path = %self.path.display(), "Settings saved");
        Ok(())
    }
}

/// Keeps settings in memory; for embedding hosts that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    settings: Mutex<Settings>,
    saves: AtomicUsize,
}

impl MemoryStore {
    /// Store seeded with a snapshot.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(settings),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of `save` calls observed.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> Result<Settings> {
        self.settings
            .lock()
            .map(|s| s.clone())
            .map_err(|_| Error::Config("settings lock poisoned".into()))
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        let mut guard = self
            .settings
            .lock()
            .map_err(|_| Error::Config("settings lock poisoned".into()))?;
        *guard = settings.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
