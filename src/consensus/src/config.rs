//! Simulation configuration

use crate::{
    error::{ConsensusError, Result},
    retention::RetentionPolicy,
    state::QuorumParams,
    Millis,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Playback settings that affect scheduling only, never vote correctness
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    /// Multiplier applied by the frame driver to each step (0.5, 1, 2)
    pub speed: f64,
    /// Move to the next phase once the current script is exhausted
    pub auto_advance: bool,
    /// Pause between an exhausted phase and the transition
    pub phase_delay_ms: Millis,
    /// Wait for an explicit client request before starting each round
    pub manual_mode: bool,
    /// Maximum random delivery delay added to each message
    pub jitter_ms: Millis,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            speed: 0.5,
            auto_advance: true,
            phase_delay_ms: 2000,
            manual_mode: false,
            jitter_ms: 0,
        }
    }
}

/// Retention bounds for the timeline and the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub timeline: RetentionPolicy,
    pub log: RetentionPolicy,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            timeline: RetentionPolicy::timeline(),
            log: RetentionPolicy::log(),
        }
    }
}

/// Simulation engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Total number of simulated nodes
    pub total_nodes: usize,

    /// Tolerated Byzantine nodes (n = 3f + 1)
    pub max_faulty: usize,

    /// Step size used when the driver does not specify one
    pub default_step_ms: Millis,

    /// Seed for the jitter RNG; `None` seeds from entropy
    pub seed: Option<u64>,

    pub driver: DriverSettings,

    pub retention: RetentionConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            total_nodes: 4,
            max_faulty: 1,
            default_step_ms: 300,
            seed: None,
            driver: DriverSettings::default(),
            retention: RetentionConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Configuration for `n` nodes with the largest tolerable `f`
    pub fn for_nodes(total_nodes: usize) -> Self {
        Self {
            total_nodes,
            max_faulty: QuorumParams::for_nodes(total_nodes).f,
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn quorum(&self) -> QuorumParams {
        QuorumParams::new(self.total_nodes, self.max_faulty)
    }

    /// Reject configurations whose quorum cannot be met.
    ///
    /// `3f + 1 > n` is an error. `n > 3f + 1` is accepted with a warning,
    /// since the engine still works with a smaller tolerance than `n` allows.
    pub fn validate(&self) -> Result<()> {
        if self.total_nodes == 0 {
            return Err(ConsensusError::InvalidConfiguration(
                "total_nodes must be at least 1".to_string(),
            ));
        }

        if 3 * self.max_faulty + 1 > self.total_nodes {
            return Err(ConsensusError::InvalidConfiguration(format!(
                "{} nodes cannot tolerate f={} (need n >= 3f + 1 = {})",
                self.total_nodes,
                self.max_faulty,
                3 * self.max_faulty + 1
            )));
        }

        if 3 * self.max_faulty + 1 < self.total_nodes {
            warn!(
                total_nodes = self.total_nodes,
                max_faulty = self.max_faulty,
                "f is below the (n - 1) / 3 tolerance this network allows"
            );
        }

        if !(self.driver.speed > 0.0 && self.driver.speed.is_finite()) {
            return Err(ConsensusError::InvalidConfiguration(format!(
                "speed must be a positive number, got {}",
                self.driver.speed
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_teaching_setup() {
        let config = SimulationConfig::default();
        assert_eq!(config.quorum().needed(), 3);
        assert_eq!(config.driver.phase_delay_ms, 2000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inconsistent_quorum_rejected() {
        let config = SimulationConfig {
            total_nodes: 4,
            max_faulty: 2,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConsensusError::InvalidConfiguration(_))
        ));

        let empty = SimulationConfig { total_nodes: 0, max_faulty: 0, ..Default::default() };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_smaller_tolerance_accepted() {
        let config = SimulationConfig {
            total_nodes: 7,
            max_faulty: 1,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(SimulationConfig::for_nodes(7).max_faulty, 2);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SimulationConfig =
            serde_json::from_str(r#"{"total_nodes": 7, "max_faulty": 2, "driver": {"jitter_ms": 40}}"#).unwrap();

        assert_eq!(config.driver.jitter_ms, 40);
        assert!(config.driver.auto_advance);
        assert_eq!(config.retention.timeline.max_entries, 500);
    }
}
