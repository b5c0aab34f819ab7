//! Prometheus metrics for the simulation

use crate::error::Result;
use prometheus::{IntCounter, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Simulation metrics, registered in a per-engine registry
pub struct SimulationMetrics {
    /// Total `step` calls
    pub steps: IntCounter,

    /// Total messages materialized onto the timeline
    pub messages_emitted: IntCounter,

    /// Messages emitted or annotated as conflicting
    pub conflicting_messages: IntCounter,

    /// Rounds whose value was committed
    pub rounds_completed: IntCounter,

    /// Leader rotations
    pub view_changes: IntCounter,

    /// Fault toggles
    pub faults_toggled: IntCounter,

    /// Messages dropped on request
    pub messages_dropped: IntCounter,

    /// Timeline and log entries removed by retention
    pub entries_pruned: IntCounter,

    /// Current view number
    pub current_view: IntGauge,

    /// Current round
    pub current_round: IntGauge,

    /// Accumulated value
    pub current_value: IntGauge,

    /// Timeline length after pruning
    pub timeline_size: IntGauge,

    /// Log length after pruning
    pub log_size: IntGauge,

    registry: Arc<Registry>,
}

impl SimulationMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<IntCounter> {
            let c = IntCounter::with_opts(Opts::new(name, help).namespace("pbftviz"))?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };
        let gauge = |name: &str, help: &str| -> Result<IntGauge> {
            let g = IntGauge::with_opts(Opts::new(name, help).namespace("pbftviz"))?;
            registry.register(Box::new(g.clone()))?;
            Ok(g)
        };

        let steps = counter("simulation_steps_total", "Total clock steps")?;
        let messages_emitted = counter("simulation_messages_emitted_total", "Total messages emitted")?;
        let conflicting_messages = counter(
            "simulation_conflicting_messages_total",
            "Messages emitted or annotated as conflicting",
        )?;
        let rounds_completed = counter("simulation_rounds_completed_total", "Rounds committed")?;
        let view_changes = counter("simulation_view_changes_total", "Total view changes")?;
        let faults_toggled = counter("simulation_faults_toggled_total", "Node fault toggles")?;
        let messages_dropped = counter("simulation_messages_dropped_total", "Messages dropped on request")?;
        let entries_pruned = counter("simulation_entries_pruned_total", "Entries removed by retention")?;
        let current_view = gauge("simulation_current_view", "Current view number")?;
        let current_round = gauge("simulation_current_round", "Current round")?;
        let current_value = gauge("simulation_current_value", "Accumulated committed value")?;
        let timeline_size = gauge("simulation_timeline_size", "Timeline length")?;
        let log_size = gauge("simulation_log_size", "Log length")?;

        Ok(Self {
            steps,
            messages_emitted,
            conflicting_messages,
            rounds_completed,
            view_changes,
            faults_toggled,
            messages_dropped,
            entries_pruned,
            current_view,
            current_round,
            current_value,
            timeline_size,
            log_size,
            registry: Arc::new(registry),
        })
    }

    /// Get Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::error::ConsensusError::Metrics(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = SimulationMetrics::new().unwrap();

        assert_eq!(metrics.steps.get(), 0);
        metrics.steps.inc();
        assert_eq!(metrics.steps.get(), 1);
    }

    #[test]
    fn test_metrics_export() {
        let metrics = SimulationMetrics::new().unwrap();
        metrics.rounds_completed.inc();

        let exported = metrics.export().unwrap();
        assert!(exported.contains("pbftviz_simulation_rounds_completed_total 1"));
    }

    #[test]
    fn test_independent_registries() {
        let a = SimulationMetrics::new().unwrap();
        let b = SimulationMetrics::new().unwrap();
        a.steps.inc();
        assert_eq!(b.steps.get(), 0);
    }
}
