//! Preference persistence for driver settings and the current view

use crate::{config::DriverSettings, error::Result, Millis, ViewNumber};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persisted user preferences; every field is optional so partial files load
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub speed: Option<f64>,
    pub auto_advance: Option<bool>,
    pub phase_delay_ms: Option<Millis>,
    pub manual_mode: Option<bool>,
    pub jitter_ms: Option<Millis>,
    pub view: Option<ViewNumber>,
}

impl Preferences {
    pub fn capture(settings: &DriverSettings, view: ViewNumber) -> Self {
        Self {
            speed: Some(settings.speed),
            auto_advance: Some(settings.auto_advance),
            phase_delay_ms: Some(settings.phase_delay_ms),
            manual_mode: Some(settings.manual_mode),
            jitter_ms: Some(settings.jitter_ms),
            view: Some(view),
        }
    }

    /// Overlay stored values onto `settings`
    pub fn apply_to(&self, settings: &mut DriverSettings) {
        if let Some(speed) = self.speed.filter(|s| *s > 0.0 && s.is_finite()) {
            settings.speed = speed;
        }
        if let Some(auto_advance) = self.auto_advance {
            settings.auto_advance = auto_advance;
        }
        if let Some(delay) = self.phase_delay_ms {
            settings.phase_delay_ms = delay;
        }
        if let Some(manual) = self.manual_mode {
            settings.manual_mode = manual;
        }
        if let Some(jitter) = self.jitter_ms {
            settings.jitter_ms = jitter;
        }
    }
}

/// Key-value store the engine loads from at construction and saves to on
/// every setter call
pub trait PreferenceStore: Send + Sync {
    fn load(&self) -> Result<Option<Preferences>>;
    fn save(&self, prefs: &Preferences) -> Result<()>;
}

/// In-memory store, mainly for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    stored: Mutex<Option<Preferences>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(prefs: Preferences) -> Self {
        Self {
            stored: Mutex::new(Some(prefs)),
        }
    }

    pub fn stored(&self) -> Option<Preferences> {
        self.stored.lock().clone()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self) -> Result<Option<Preferences>> {
        Ok(self.stored.lock().clone())
    }

    fn save(&self, prefs: &Preferences) -> Result<()> {
        *self.stored.lock() = Some(prefs.clone());
        Ok(())
    }
}

/// JSON file store; a missing file loads as no preferences
#[derive(Debug, Clone)]
pub struct JsonFilePreferenceStore {
    path: PathBuf,
}

impl JsonFilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for JsonFilePreferenceStore {
    fn load(&self) -> Result<Option<Preferences>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save(&self, prefs: &Preferences) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(prefs)?)?;
        Ok(())
    }
}
