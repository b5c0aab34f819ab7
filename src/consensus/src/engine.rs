//! Simulation engine
//!
//! Owns the whole simulation state and exposes the single time-advance
//! primitive [`SimulationEngine::step`] plus the control operations a
//! teaching UI calls. All operations are synchronous `&mut self`
//! transactions; hosts that share an engine must serialize access.

use crate::{
    clock::{Clock, PendingTransition, Phase},
    config::{DriverSettings, SimulationConfig},
    error::{ConsensusError, Result},
    events::{SimulationEvent, EVENT_CHANNEL_CAPACITY},
    message::TimelineMessage,
    metrics::SimulationMetrics,
    preferences::{PreferenceStore, Preferences},
    replay::{replay_window, summarize, ReplayContext, ReplayOutcome},
    round::RoundState,
    scene::SceneTable,
    state::{Node, NodeState, NodeVoteStats, QuorumParams},
    timeline::{EventLog, LogEntry, Timeline},
    view_change::ViewState,
    votes::{compute_stats, quorum_progress, QuorumProgress},
    Millis, NodeIndex, ViewNumber,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Point-in-time copy of everything a renderer needs
#[derive(Debug, Clone, Serialize)]
pub struct SimulationSnapshot {
    pub session_id: Uuid,
    pub t: Millis,
    pub phase: Phase,
    pub phase_start: Millis,
    pub playing: bool,
    pub phase_advance_due_at: Option<Millis>,
    pub awaiting_request: bool,
    pub round: RoundState,
    pub view: ViewState,
    pub quorum: QuorumParams,
    pub needed: usize,
    pub nodes: Vec<Node>,
    pub stats: Vec<NodeVoteStats>,
    pub progress: Option<QuorumProgress>,
    pub timeline: Vec<TimelineMessage>,
    pub log: Vec<LogEntry>,
    pub explanation: String,
    pub settings: DriverSettings,
}

/// Deterministic PBFT replay and bookkeeping engine
pub struct SimulationEngine {
    /// Distinguishes parallel instances in logs
    id: Uuid,

    config: SimulationConfig,

    quorum: QuorumParams,

    scenes: SceneTable,

    clock: Clock,

    /// Scheduled auto-advance, if any
    pending: Option<PendingTransition>,

    /// Round finished in manual mode, parked until `trigger_request`
    awaiting_request: bool,

    round: RoundState,

    view: ViewState,

    nodes: Vec<Node>,

    /// Derived; empty until the next recompute after a phase reset
    stats: Vec<NodeVoteStats>,

    timeline: Timeline,

    log: EventLog,

    explanation: String,

    settings: DriverSettings,

    /// Jitter source, seeded from config for reproducible runs
    rng: ChaCha8Rng,

    metrics: Arc<SimulationMetrics>,

    events: broadcast::Sender<SimulationEvent>,

    preferences: Option<Arc<dyn PreferenceStore>>,
}

impl SimulationEngine {
    /// Create an engine with the standard scene table for `config.total_nodes`
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let scenes = SceneTable::standard(config.total_nodes);
        Self::with_scenes(config, scenes)
    }

    /// Create an engine replaying a caller-supplied scene table
    pub fn with_scenes(config: SimulationConfig, scenes: SceneTable) -> Result<Self> {
        config.validate()?;

        let quorum = config.quorum();
        let view = ViewState::new(0, quorum.n);
        let nodes = (0..quorum.n).map(|id| Node::new(id, view.leader_id)).collect();
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let explanation = scenes.scene(Phase::Request).opening_narration().to_string();

        let engine = Self {
            id: Uuid::new_v4(),
            settings: config.driver,
            quorum,
            scenes,
            clock: Clock::new(Phase::Request),
            pending: None,
            awaiting_request: false,
            round: RoundState::new(),
            view,
            nodes,
            stats: Vec::new(),
            timeline: Timeline::new(),
            log: EventLog::new(),
            explanation,
            rng,
            metrics: Arc::new(SimulationMetrics::new()?),
            events,
            preferences: None,
            config,
        };

        info!(
            session = %engine.id,
            total_nodes = quorum.n,
            max_faulty = quorum.f,
            quorum_size = quorum.needed(),
            "Created PBFT simulation"
        );

        Ok(engine)
    }

    /// Attach a preference store, applying any stored settings and view.
    ///
    /// Load failures are logged and ignored.
    pub fn with_preference_store(mut self, store: Arc<dyn PreferenceStore>) -> Self {
        match store.load() {
            Ok(Some(prefs)) => {
                prefs.apply_to(&mut self.settings);
                if let Some(view) = prefs.view {
                    self.view = ViewState::new(view, self.quorum.n);
                    self.view.assign_roles(&mut self.nodes);
                    self.metrics.current_view.set(view as i64);
                }
                debug!(session = %self.id, "Loaded preferences");
            }
            Ok(None) => {}
            Err(e) => warn!(session = %self.id, error = %e, "Failed to load preferences"),
        }
        self.preferences = Some(store);
        self
    }

    // ------------------------------------------------------------------
    // Clock and phase driver
    // ------------------------------------------------------------------

    /// Advance the logical clock by `delta_ms`.
    ///
    /// Replays due scene steps, runs auto-advance scheduling when playing,
    /// then applies retention. Never fails.
    pub fn step(&mut self, delta_ms: Millis) {
        let next = self.clock.t.saturating_add(delta_ms);
        let phase = self.clock.phase;
        let scene = self
            .scenes
            .scene_for_leader(phase, self.view.leader_id, self.quorum.n);
        let window = self.clock.window_to(next);

        let ctx = ReplayContext {
            expected_payload: &self.round.expected_payload,
            nodes: &self.nodes,
            jitter_ms: self.settings.jitter_ms,
            emitted_at: next,
        };
        let outcome = replay_window(&scene, window, &ctx, &mut self.rng);
        self.apply_replay(outcome, next);

        self.clock.advance(next, window);
        self.metrics.steps.inc();

        if self.clock.playing && self.settings.auto_advance && window.through > scene.last_at_ms() {
            match phase.next() {
                Some(next_phase) => self.schedule_phase(next_phase, next),
                None => self.schedule_round(next),
            }
        }

        self.apply_retention(next);
        self.emit(SimulationEvent::Stepped { t: next });
    }

    /// Step by the configured default step size
    pub fn step_default(&mut self) {
        self.step(self.config.default_step_ms);
    }

    /// Jump to `phase` at the current time and stop playback
    pub fn set_phase(&mut self, phase: Phase) {
        self.clock.enter(phase);
        self.clock.playing = false;
        self.pending = None;
        self.awaiting_request = false;
        self.stats.clear();
        self.explanation = self.opening_narration(phase);

        info!(session = %self.id, %phase, t = self.clock.t, "Phase set");
        self.emit(SimulationEvent::PhaseChanged { t: self.clock.t, phase });
    }

    /// Replay the current phase from its beginning, keeping round state
    pub fn reset_phase(&mut self) {
        let phase = self.clock.phase;
        self.clock.enter(phase);
        self.clock.playing = false;
        self.pending = None;
        self.awaiting_request = false;
        self.timeline.clear();
        self.log.clear();
        self.stats.clear();
        self.explanation = self.opening_narration(phase);
        self.update_size_gauges();

        info!(session = %self.id, %phase, "Phase reset");
        self.emit(SimulationEvent::Reset);
    }

    /// Back to round 1 at `t = 0`; fault flags and the view are preserved
    pub fn reset_all(&mut self) {
        self.clock.rewind(Phase::Request);
        self.pending = None;
        self.awaiting_request = false;
        self.round = RoundState::new();
        self.timeline.clear();
        self.log.clear();
        self.stats.clear();
        self.explanation = self.opening_narration(Phase::Request);
        self.update_round_gauges();
        self.update_size_gauges();

        info!(session = %self.id, "Simulation reset");
        self.emit(SimulationEvent::Reset);
    }

    /// Perform the next transition immediately instead of waiting
    pub fn skip_phase(&mut self) {
        let now = self.clock.t;
        match self.clock.phase.next() {
            Some(next_phase) => self.enter_phase(next_phase, " (skipped)"),
            None => {
                self.finish_round(now, " (skipped)");
                self.start_next_round();
            }
        }
    }

    /// Toggle playback, returning the new state.
    ///
    /// Playback gates auto-advance; the external driver decides whether to
    /// keep calling `step`.
    pub fn toggle_play(&mut self) -> bool {
        self.clock.playing = !self.clock.playing;
        self.clock.playing
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.clock.playing = playing;
    }

    fn schedule_phase(&mut self, next_phase: Phase, now: Millis) {
        match self.pending {
            None => {
                let due_at = now.saturating_add(self.settings.phase_delay_ms);
                self.pending = Some(PendingTransition::NextPhase { phase: next_phase, due_at });
                self.log.push(
                    now,
                    format!(
                        "... Waiting {:.1}s before next phase ({next_phase})",
                        self.settings.phase_delay_ms as f64 / 1000.0
                    ),
                );
            }
            Some(PendingTransition::NextPhase { phase, due_at }) if now >= due_at => {
                self.enter_phase(phase, "");
            }
            Some(_) => {}
        }
    }

    fn enter_phase(&mut self, phase: Phase, note: &str) {
        self.clock.enter(phase);
        self.pending = None;
        self.explanation = self.opening_narration(phase);
        self.log.push(self.clock.t, format!("--> Phase: {phase}{note}"));
        // The timeline is kept so earlier arrows can fade; stats follow the new phase
        self.recompute_stats();

        info!(session = %self.id, %phase, t = self.clock.t, "Entered phase");
        self.emit(SimulationEvent::PhaseChanged { t: self.clock.t, phase });
    }

    fn opening_narration(&self, phase: Phase) -> String {
        self.scenes.scene(phase).opening_narration().to_string()
    }

    // ------------------------------------------------------------------
    // Replay and retention
    // ------------------------------------------------------------------

    fn apply_replay(&mut self, outcome: ReplayOutcome, now: Millis) {
        for narration in outcome.narrations {
            self.log.push(now, narration.clone());
            self.explanation = narration.clone();
            self.emit(SimulationEvent::Narration { t: now, text: narration });
        }

        if outcome.messages.is_empty() {
            return;
        }

        for line in summarize(&outcome.messages) {
            self.log.push(now, line);
        }

        let count = outcome.messages.len();
        let conflicting = outcome.messages.iter().filter(|m| m.is_conflicting()).count();
        self.metrics.messages_emitted.inc_by(count as u64);
        self.metrics.conflicting_messages.inc_by(conflicting as u64);

        self.timeline.extend(outcome.messages);
        self.recompute_stats();
        self.emit(SimulationEvent::MessagesEmitted { t: now, count });
    }

    fn apply_retention(&mut self, now: Millis) {
        let retention = self.config.retention;
        let pruned_messages = self.timeline.prune(&retention.timeline, now);
        let pruned_logs = self.log.prune(&retention.log, now);

        if pruned_messages > 0 && !self.stats.is_empty() {
            self.recompute_stats();
        }
        let pruned = pruned_messages + pruned_logs;
        if pruned > 0 {
            debug!(session = %self.id, pruned_messages, pruned_logs, "Pruned history");
            self.metrics.entries_pruned.inc_by(pruned as u64);
        }
        self.update_size_gauges();
    }

    fn recompute_stats(&mut self) {
        self.stats = compute_stats(
            self.timeline.messages(),
            &self.round.expected_payload,
            self.clock.phase,
            &self.quorum,
            self.view.leader_id,
        );
    }

    // ------------------------------------------------------------------
    // Round lifecycle
    // ------------------------------------------------------------------

    fn schedule_round(&mut self, now: Millis) {
        match self.pending {
            Some(PendingTransition::NextRound { due_at }) if now >= due_at => {
                if self.settings.manual_mode {
                    self.pending = None;
                    self.park_for_request(now);
                } else {
                    self.start_next_round();
                }
            }
            Some(_) => {}
            None if self.awaiting_request => {
                // manual mode was switched off while parked
                if !self.settings.manual_mode {
                    self.start_next_round();
                }
            }
            None => {
                self.finish_round(now, "");
                let due_at = now.saturating_add(self.settings.phase_delay_ms);
                self.pending = Some(PendingTransition::NextRound { due_at });
                self.log.push(
                    now,
                    format!(
                        "... Waiting {:.1}s before next round",
                        self.settings.phase_delay_ms as f64 / 1000.0
                    ),
                );
            }
        }
    }

    /// Apply the round's value exactly once
    fn finish_round(&mut self, now: Millis, note: &str) {
        let round = self.round.round;
        if let Some(value) = self.round.complete() {
            self.log.push(now, format!("✓ Round {round} committed{note}. Result value = {value}"));
            self.metrics.rounds_completed.inc();
            self.update_round_gauges();

            info!(session = %self.id, round, value, "Round committed");
            self.emit(SimulationEvent::RoundCompleted { round, value });
        }
    }

    fn park_for_request(&mut self, now: Millis) {
        self.awaiting_request = true;
        self.log.push(now, "... Waiting for Client Request (Manual Mode)");
        self.emit(SimulationEvent::AwaitingRequest { round: self.round.round });
    }

    /// Begin the next round with a fresh proposal; the clock keeps running
    pub fn start_next_round(&mut self) {
        self.round.advance();
        self.clock.enter(Phase::Request);
        self.pending = None;
        self.awaiting_request = false;
        self.stats.clear();
        self.explanation = self.opening_narration(Phase::Request);
        self.log.push(
            self.clock.t,
            format!(
                "==> Round {} start. Proposed delta {}",
                self.round.round, self.round.expected_payload
            ),
        );
        self.update_round_gauges();

        info!(
            session = %self.id,
            round = self.round.round,
            expected_payload = %self.round.expected_payload,
            "Round started"
        );
        self.emit(SimulationEvent::RoundStarted {
            round: self.round.round,
            expected_payload: self.round.expected_payload.clone(),
        });
    }

    /// Client sends a new request: starts the next round
    pub fn trigger_request(&mut self) {
        debug!(session = %self.id, awaiting = self.awaiting_request, "Client request triggered");
        self.start_next_round();
    }

    // ------------------------------------------------------------------
    // Faults and view changes
    // ------------------------------------------------------------------

    /// Flip a node between Normal and Faulty.
    ///
    /// Becoming faulty retroactively marks the node's past messages as
    /// conflicting; returning to normal leaves history untouched.
    pub fn toggle_faulty(&mut self, node_id: NodeIndex) -> Result<NodeState> {
        let total = self.nodes.len();
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or(ConsensusError::UnknownNode { node: node_id, total })?;
        node.state = node.state.toggled();
        let state = node.state;

        let rewritten = match state {
            NodeState::Faulty => self
                .timeline
                .annotate_conflicting(node_id, &self.round.expected_payload),
            NodeState::Normal => 0,
        };

        let text = match state {
            NodeState::Faulty => format!("*** Node n{node_id} became FAULTY"),
            NodeState::Normal => format!("*** Node n{node_id} returned to NORMAL"),
        };
        self.log.push(self.clock.t, text);
        self.recompute_stats();
        self.metrics.faults_toggled.inc();
        self.metrics.conflicting_messages.inc_by(rewritten as u64);

        info!(session = %self.id, node = node_id, ?state, rewritten, "Node fault state toggled");
        self.emit(SimulationEvent::NodeToggled { node: node_id, state });
        Ok(state)
    }

    /// Move to the next view and relabel the leader, returning it
    pub fn rotate_leader(&mut self) -> NodeIndex {
        let leader_id = self.view.rotate(self.quorum.n);
        self.view.assign_roles(&mut self.nodes);
        self.log.push(
            self.clock.t,
            format!("!!! VIEW CHANGE: View {}, New Leader n{leader_id}", self.view.view),
        );
        self.recompute_stats();
        self.metrics.view_changes.inc();
        self.metrics.current_view.set(self.view.view as i64);
        self.persist_preferences();

        info!(session = %self.id, view = self.view.view, leader_id, "View change");
        self.emit(SimulationEvent::ViewChanged { view: self.view.view, leader_id });
        leader_id
    }

    /// Remove a message from the timeline, simulating its loss.
    ///
    /// Every entry with `message_id` goes, including copies from earlier
    /// rounds. Returns the number removed.
    pub fn drop_message(&mut self, message_id: &str) -> usize {
        let removed = self.timeline.remove(message_id);
        if removed == 0 {
            return 0;
        }
        self.log.push(self.clock.t, format!("--- Message {message_id} dropped by user"));
        self.recompute_stats();
        self.metrics.messages_dropped.inc_by(removed as u64);
        self.update_size_gauges();

        info!(session = %self.id, message_id, removed, "Message dropped");
        self.emit(SimulationEvent::MessageDropped { message_id: message_id.to_string() });
        removed
    }

    // ------------------------------------------------------------------
    // Driver settings
    // ------------------------------------------------------------------

    pub fn set_speed(&mut self, speed: f64) -> Result<()> {
        if !(speed > 0.0 && speed.is_finite()) {
            return Err(ConsensusError::InvalidConfiguration(format!(
                "speed must be a positive number, got {speed}"
            )));
        }
        self.settings.speed = speed;
        self.persist_preferences();
        Ok(())
    }

    /// Disabling auto-advance cancels any scheduled transition
    pub fn set_auto_advance(&mut self, on: bool) {
        self.settings.auto_advance = on;
        if !on {
            self.pending = None;
        }
        self.persist_preferences();
    }

    pub fn set_phase_delay(&mut self, delay_ms: Millis) {
        self.settings.phase_delay_ms = delay_ms;
        self.persist_preferences();
    }

    pub fn set_manual_mode(&mut self, manual: bool) {
        self.settings.manual_mode = manual;
        self.persist_preferences();
    }

    pub fn set_jitter(&mut self, jitter_ms: Millis) {
        self.settings.jitter_ms = jitter_ms;
        self.persist_preferences();
    }

    /// Restore default driver settings and view 0, then save them
    pub fn reset_preferences(&mut self) {
        self.settings = DriverSettings::default();
        self.pending = None;
        self.view = ViewState::new(0, self.quorum.n);
        self.view.assign_roles(&mut self.nodes);
        self.metrics.current_view.set(0);
        self.recompute_stats();
        self.persist_preferences();

        info!(session = %self.id, "Preferences reset");
        self.emit(SimulationEvent::ViewChanged { view: 0, leader_id: self.view.leader_id });
    }

    fn persist_preferences(&self) {
        let Some(store) = &self.preferences else {
            return;
        };
        let prefs = Preferences::capture(&self.settings, self.view.view);
        if let Err(e) = store.save(&prefs) {
            warn!(session = %self.id, error = %e, "Failed to save preferences");
        }
    }

    // ------------------------------------------------------------------
    // Read API
    // ------------------------------------------------------------------

    pub fn session_id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn t(&self) -> Millis {
        self.clock.t
    }

    pub fn phase(&self) -> Phase {
        self.clock.phase
    }

    pub fn phase_start(&self) -> Millis {
        self.clock.phase_start
    }

    pub fn is_playing(&self) -> bool {
        self.clock.playing
    }

    pub fn phase_advance_due_at(&self) -> Option<Millis> {
        self.pending.map(|p| p.due_at())
    }

    pub fn pending_transition(&self) -> Option<PendingTransition> {
        self.pending
    }

    pub fn is_awaiting_request(&self) -> bool {
        self.awaiting_request
    }

    pub fn quorum(&self) -> QuorumParams {
        self.quorum
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn stats(&self) -> &[NodeVoteStats] {
        &self.stats
    }

    pub fn progress(&self) -> Option<QuorumProgress> {
        quorum_progress(&self.stats, &self.nodes, self.clock.phase, &self.quorum)
    }

    pub fn timeline(&self) -> &[TimelineMessage] {
        self.timeline.messages()
    }

    pub fn log(&self) -> &[LogEntry] {
        self.log.entries()
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    pub fn round(&self) -> &RoundState {
        &self.round
    }

    pub fn view(&self) -> ViewNumber {
        self.view.view
    }

    pub fn leader_id(&self) -> NodeIndex {
        self.view.leader_id
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    pub fn metrics(&self) -> Arc<SimulationMetrics> {
        self.metrics.clone()
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SimulationEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> SimulationSnapshot {
        SimulationSnapshot {
            session_id: self.id,
            t: self.clock.t,
            phase: self.clock.phase,
            phase_start: self.clock.phase_start,
            playing: self.clock.playing,
            phase_advance_due_at: self.phase_advance_due_at(),
            awaiting_request: self.awaiting_request,
            round: self.round.clone(),
            view: self.view,
            quorum: self.quorum,
            needed: self.quorum.needed(),
            nodes: self.nodes.clone(),
            stats: self.stats.clone(),
            progress: self.progress(),
            timeline: self.timeline.messages().to_vec(),
            log: self.log.entries().to_vec(),
            explanation: self.explanation.clone(),
            settings: self.settings,
        }
    }

    fn emit(&self, event: SimulationEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn update_round_gauges(&self) {
        self.metrics.current_round.set(self.round.round as i64);
        self.metrics.current_value.set(self.round.value);
    }

    fn update_size_gauges(&self) {
        self.metrics.timeline_size.set(self.timeline.len() as i64);
        self.metrics.log_size.set(self.log.len() as i64);
    }
}
