//! Node configuration loading and validation

use anyhow::{Context, Result};
use pbftviz_consensus::SimulationConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete node configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,

    #[serde(default)]
    pub ticker: TickerSection,

    #[serde(default)]
    pub logging: LoggingSection,

    #[serde(default)]
    pub preferences: PreferencesSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TickerSection {
    /// Wall-clock frame interval
    #[serde(default = "default_frame_ms")]
    pub frame_ms: u64,
    /// Stop after this many completed rounds; run forever when unset
    #[serde(default)]
    pub max_rounds: Option<u64>,
    /// Start playing immediately
    #[serde(default = "default_true")]
    pub autoplay: bool,
}

impl Default for TickerSection {
    fn default() -> Self {
        Self {
            frame_ms: default_frame_ms(),
            max_rounds: None,
            autoplay: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Echo simulation events as JSON lines
    #[serde(default)]
    pub json_events: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_events: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PreferencesSection {
    /// JSON file holding driver settings and the current view
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// Default value functions
fn default_true() -> bool { true }
fn default_frame_ms() -> u64 { 16 }
fn default_log_level() -> String { "info".to_string() }

impl NodeConfig {
    /// Load configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read configuration file {:?}", path.as_ref()))?;

        let config: NodeConfig = toml::from_str(&contents)
            .context("Failed to parse configuration file")?;

        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.simulation
            .validate()
            .context("Invalid [simulation] section")?;

        if self.ticker.frame_ms == 0 {
            anyhow::bail!("Ticker frame_ms must be at least 1");
        }

        if self.ticker.max_rounds == Some(0) {
            anyhow::bail!("Ticker max_rounds must be at least 1 when set");
        }

        Ok(())
    }
}
