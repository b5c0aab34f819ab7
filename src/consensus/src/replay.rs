//! Timeline replay: turns due scene steps into timeline messages

use crate::{
    clock::LocalWindow,
    message::{conflicting_payload, MessageKind, TimelineMessage},
    scene::Scene,
    state::Node,
    Millis,
};
use rand::Rng;
use tracing::debug;

/// Inputs that shape how due messages are materialized
#[derive(Debug, Clone, Copy)]
pub struct ReplayContext<'a> {
    /// Replaces the `"v"` placeholder
    pub expected_payload: &'a str,
    /// Fault state of senders
    pub nodes: &'a [Node],
    /// Maximum simulated network delay added to `emitted_at`
    pub jitter_ms: Millis,
    /// Logical time of this replay (`next`)
    pub emitted_at: Millis,
}

/// Result of replaying one window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub messages: Vec<TimelineMessage>,
    pub narrations: Vec<String>,
}

impl ReplayOutcome {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.narrations.is_empty()
    }
}

/// Materialize every step of `scene` whose `at_ms` falls inside `window`.
///
/// Messages from a faulty sender get a divergent `"{payload}*"` payload and
/// are flagged conflicting. Steps are processed in script order.
pub fn replay_window<R: Rng + ?Sized>(
    scene: &Scene,
    window: LocalWindow,
    ctx: &ReplayContext<'_>,
    rng: &mut R,
) -> ReplayOutcome {
    let mut outcome = ReplayOutcome::default();

    for step in scene.steps.iter().filter(|s| window.contains(s.at_ms)) {
        for template in &step.messages {
            let base = template.resolved_payload(ctx.expected_payload);
            let faulty = template
                .from
                .node_within(ctx.nodes.len())
                .map_or(false, |idx| ctx.nodes[idx].is_faulty());

            let at = if ctx.jitter_ms > 0 {
                ctx.emitted_at.saturating_add(rng.gen_range(0..=ctx.jitter_ms))
            } else {
                ctx.emitted_at
            };

            let msg = if faulty || template.conflicting {
                TimelineMessage::new(template, conflicting_payload(&base), true, at)
            } else {
                TimelineMessage::new(template, base, false, at)
            };
            outcome.messages.push(msg);
        }

        if let Some(narration) = &step.narration {
            outcome.narrations.push(narration.clone());
        }
    }

    debug!(
        phase = %scene.phase,
        after = ?window.after,
        through = window.through,
        messages = outcome.messages.len(),
        "Replayed scene window"
    );

    outcome
}

/// One log line per message kind, in order of first appearance
pub fn summarize(messages: &[TimelineMessage]) -> Vec<String> {
    let mut groups: Vec<(MessageKind, Vec<String>)> = Vec::new();

    for msg in messages {
        match groups.iter_mut().find(|(kind, _)| *kind == msg.kind()) {
            Some((_, routes)) => routes.push(msg.route()),
            None => groups.push((msg.kind(), vec![msg.route()])),
        }
    }

    groups
        .into_iter()
        .map(|(kind, routes)| format!("{} {}", kind.label(), routes.join(", ")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::Phase, message::Endpoint, scene::SceneTable, state::NodeState};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn nodes(faulty: &[usize]) -> Vec<Node> {
        (0..4)
            .map(|id| {
                let mut node = Node::new(id, 0);
                if faulty.contains(&id) {
                    node.state = NodeState::Faulty;
                }
                node
            })
            .collect()
    }

    #[test]
    fn test_placeholder_substitution() {
        let scene = SceneTable::standard(4).scene(Phase::PrePrepare);
        let nodes = nodes(&[]);
        let ctx = ReplayContext { expected_payload: "+3", nodes: &nodes, jitter_ms: 0, emitted_at: 500 };
        let window = LocalWindow { after: None, through: 0 };

        let outcome = replay_window(&scene, window, &ctx, &mut ChaCha8Rng::seed_from_u64(1));

        assert_eq!(outcome.messages.len(), 3);
        assert!(outcome.messages.iter().all(|m| m.payload() == "+3" && m.at() == 500));
        assert_eq!(outcome.narrations.len(), 1);
    }

    #[test]
    fn test_faulty_sender_diverges() {
        let scene = SceneTable::standard(4).scene(Phase::PrePrepare);
        let nodes = nodes(&[0]);
        let ctx = ReplayContext { expected_payload: "+1", nodes: &nodes, jitter_ms: 0, emitted_at: 0 };
        let window = LocalWindow { after: None, through: 100 };

        let outcome = replay_window(&scene, window, &ctx, &mut ChaCha8Rng::seed_from_u64(1));

        assert!(outcome.messages.iter().all(|m| m.is_conflicting() && m.payload() == "+1*"));
    }

    #[test]
    fn test_jitter_bounded_and_seeded() {
        let scene = SceneTable::standard(4).scene(Phase::Reply);
        let nodes = nodes(&[]);
        let ctx = ReplayContext { expected_payload: "+1", nodes: &nodes, jitter_ms: 250, emitted_at: 1000 };
        let window = LocalWindow { after: None, through: 0 };

        let first = replay_window(&scene, window, &ctx, &mut ChaCha8Rng::seed_from_u64(7));
        let second = replay_window(&scene, window, &ctx, &mut ChaCha8Rng::seed_from_u64(7));

        assert_eq!(first, second);
        assert!(first.messages.iter().all(|m| (1000..=1250).contains(&m.at())));
        assert!(first.messages.iter().all(|m| m.to() == Endpoint::Client));
    }

    #[test]
    fn test_jitter_saturates_at_clock_limit() {
        let scene = SceneTable::standard(4).scene(Phase::PrePrepare);
        let nodes = nodes(&[]);
        let ctx = ReplayContext { expected_payload: "+1", nodes: &nodes, jitter_ms: Millis::MAX, emitted_at: Millis::MAX - 10 };
        let window = LocalWindow { after: None, through: 0 };

        for seed in 0..32 {
            let outcome = replay_window(&scene, window, &ctx, &mut ChaCha8Rng::seed_from_u64(seed));
            assert_eq!(outcome.messages.len(), 3);
            assert!(outcome.messages.iter().all(|m| m.at() >= Millis::MAX - 10));
        }
    }

    #[test]
    fn test_empty_window_replays_nothing() {
        let scene = SceneTable::standard(4).scene(Phase::Prepare);
        let nodes = nodes(&[]);
        let ctx = ReplayContext { expected_payload: "+1", nodes: &nodes, jitter_ms: 0, emitted_at: 0 };
        let window = LocalWindow { after: Some(100), through: 200 };

        assert!(replay_window(&scene, window, &ctx, &mut ChaCha8Rng::seed_from_u64(1)).is_empty());
    }

    #[test]
    fn test_summary_groups_by_kind() {
        let scene = SceneTable::standard(4).scene(Phase::Prepare);
        let nodes = nodes(&[2]);
        let ctx = ReplayContext { expected_payload: "+1", nodes: &nodes, jitter_ms: 0, emitted_at: 0 };
        let window = LocalWindow { after: None, through: 2 * crate::scene::STEP_MS };

        let outcome = replay_window(&scene, window, &ctx, &mut ChaCha8Rng::seed_from_u64(1));
        let lines = summarize(&outcome.messages);

        assert_eq!(outcome.messages.len(), 9);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("[PREPARE] n0->n1, n0->n2"));
        assert!(lines[0].contains("n2->n0(!)"));
    }
}
