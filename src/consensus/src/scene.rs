//! Scene table: the timed script replayed for each phase

use crate::{
    clock::Phase,
    error::Result,
    message::{Endpoint, MessageKind, ScriptedMessage, VALUE_PLACEHOLDER},
    Millis, NodeIndex,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Spacing between scripted steps (ms)
pub const STEP_MS: Millis = 1200;

/// One timed entry of a scene
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneStep {
    pub at_ms: Millis,
    #[serde(default)]
    pub messages: Vec<ScriptedMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narration: Option<String>,
}

impl SceneStep {
    pub fn new(at_ms: Millis, narration: impl Into<String>) -> Self {
        Self {
            at_ms,
            messages: Vec::new(),
            narration: Some(narration.into()),
        }
    }

    pub fn with_messages(mut self, messages: Vec<ScriptedMessage>) -> Self {
        self.messages = messages;
        self
    }
}

/// Ordered script for one phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub phase: Phase,
    pub steps: Vec<SceneStep>,
}

impl Scene {
    pub fn empty(phase: Phase) -> Self {
        Self { phase, steps: Vec::new() }
    }

    /// Latest scheduled step, 0 for an empty scene
    pub fn last_at_ms(&self) -> Millis {
        self.steps.iter().map(|s| s.at_ms).max().unwrap_or(0)
    }

    /// Narration of the first step, shown when the phase is entered
    pub fn opening_narration(&self) -> &str {
        self.steps
            .first()
            .and_then(|s| s.narration.as_deref())
            .unwrap_or("")
    }

    /// Rotate node endpoints so the scene is played from `leader_id`'s view.
    ///
    /// Every node endpoint `e` becomes `(e + leader_id) mod n`; the client
    /// passes through unchanged.
    pub fn remap(&self, leader_id: NodeIndex, n: usize) -> Scene {
        if leader_id == 0 || n == 0 {
            return self.clone();
        }

        let rotate = |endpoint: Endpoint| match endpoint {
            Endpoint::Node(e) => Endpoint::Node((e + leader_id) % n),
            Endpoint::Client => Endpoint::Client,
        };

        Scene {
            phase: self.phase,
            steps: self
                .steps
                .iter()
                .map(|step| SceneStep {
                    at_ms: step.at_ms,
                    narration: step.narration.clone(),
                    messages: step
                        .messages
                        .iter()
                        .map(|m| ScriptedMessage {
                            from: rotate(m.from),
                            to: rotate(m.to),
                            ..m.clone()
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Read-only lookup of scenes by phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneTable {
    scenes: BTreeMap<Phase, Scene>,
}

impl SceneTable {
    pub fn new(scenes: impl IntoIterator<Item = Scene>) -> Self {
        Self {
            scenes: scenes.into_iter().map(|s| (s.phase, s)).collect(),
        }
    }

    /// Scene for `phase`; phases without a script replay nothing
    pub fn scene(&self, phase: Phase) -> Scene {
        self.scenes
            .get(&phase)
            .cloned()
            .unwrap_or_else(|| Scene::empty(phase))
    }

    /// Scene for `phase` as seen from the current leader
    pub fn scene_for_leader(&self, phase: Phase, leader_id: NodeIndex, n: usize) -> Scene {
        match self.scenes.get(&phase) {
            Some(scene) => scene.remap(leader_id, n),
            None => Scene::empty(phase),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Standard script for `n` nodes with node 0 as leader.
    ///
    /// For `n = 4` this is the classic teaching table: the leader and the
    /// three replicas each broadcast PREPARE and COMMIT one step apart.
    pub fn standard(n: usize) -> Self {
        let replicas = || (1..n).map(Endpoint::Node);
        let v = VALUE_PLACEHOLDER;

        let request = Scene {
            phase: Phase::Request,
            steps: vec![
                SceneStep::new(0, "Client sends REQUEST for operation v to the leader.").with_messages(vec![
                    ScriptedMessage::new("rq-0", Endpoint::Client, Endpoint::Node(0), MessageKind::Request, v),
                ]),
                SceneStep::new(STEP_MS, "Leader accepts the request and assigns it a sequence number in the current view."),
            ],
        };

        let pre_prepare = Scene {
            phase: Phase::PrePrepare,
            steps: vec![
                SceneStep::new(0, "Leader proposes a value v with sequence number and view, broadcasting PRE-PREPARE.")
                    .with_messages(
                        replicas()
                            .map(|to| {
                                let id = format!("pp-{}", i64::from(to));
                                ScriptedMessage::new(id, Endpoint::Node(0), to, MessageKind::PrePrepare, v)
                            })
                            .collect(),
                    ),
                SceneStep::new(STEP_MS, "Replicas validate PRE-PREPARE (correct view, sequence, digest) and become READY to send PREPARE."),
            ],
        };

        let mut prepare_steps: Vec<SceneStep> = (0..n)
            .map(|from| {
                let narration = if from == 0 {
                    "Leader also acts as a replica: it records its own PREPARE vote and multicasts PREPARE for v.".to_string()
                } else {
                    format!("Replica n{from} broadcasts PREPARE for v to all nodes.")
                };
                SceneStep::new(from as Millis * STEP_MS, narration)
                    .with_messages(broadcast(n, from, MessageKind::Prepare, "pr"))
            })
            .collect();
        prepare_steps.push(SceneStep::new(
            n as Millis * STEP_MS,
            "Condition met (2f + 1 PREPARE including own vote per node). System is ready to enter COMMIT phase.",
        ));

        let mut commit_steps: Vec<SceneStep> = (0..n)
            .map(|from| {
                let narration = if from == 0 {
                    "Prepared replicas (including leader) broadcast COMMIT to all, counting their own vote locally.".to_string()
                } else {
                    format!("Replica n{from} announces COMMIT for v to all.")
                };
                SceneStep::new(from as Millis * STEP_MS, narration)
                    .with_messages(broadcast(n, from, MessageKind::Commit, "cm"))
            })
            .collect();
        commit_steps.push(SceneStep::new(
            n as Millis * STEP_MS,
            "Replicas collect 2f + 1 COMMIT messages, locally executing value v (decision).",
        ));
        commit_steps.push(SceneStep::new(
            (n as Millis + 1) * STEP_MS,
            "Consensus achieved for value v. Protocol round complete.",
        ));

        let reply = Scene {
            phase: Phase::Reply,
            steps: vec![
                SceneStep::new(0, "Every replica executes v and sends REPLY with the result to the client.")
                    .with_messages(
                        (0..n)
                            .map(|from| {
                                ScriptedMessage::new(format!("rp-{from}"), Endpoint::Node(from), Endpoint::Client, MessageKind::Reply, v)
                            })
                            .collect(),
                    ),
                SceneStep::new(STEP_MS, "Client accepts the result after f + 1 matching REPLY messages."),
            ],
        };

        Self::new([
            request,
            pre_prepare,
            Scene { phase: Phase::Prepare, steps: prepare_steps },
            Scene { phase: Phase::Commit, steps: commit_steps },
            reply,
        ])
    }
}

impl Default for SceneTable {
    fn default() -> Self {
        Self::standard(4)
    }
}

fn broadcast(n: usize, from: NodeIndex, kind: MessageKind, prefix: &str) -> Vec<ScriptedMessage> {
    (0..n)
        .filter(|to| *to != from)
        .map(|to| {
            ScriptedMessage::new(
                format!("{prefix}-{from}-{to}"),
                Endpoint::Node(from),
                Endpoint::Node(to),
                kind,
                VALUE_PLACEHOLDER,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_shape() {
        let table = SceneTable::standard(4);

        let prepare = table.scene(Phase::Prepare);
        assert_eq!(prepare.steps.len(), 5);
        assert_eq!(prepare.last_at_ms(), 4 * STEP_MS);
        assert!(prepare.steps[..4].iter().all(|s| s.messages.len() == 3));

        let pre_prepare = table.scene(Phase::PrePrepare);
        assert_eq!(pre_prepare.steps[0].messages.len(), 3);
        assert!(pre_prepare.steps[0].messages.iter().all(|m| m.from == Endpoint::Node(0)));

        let commit = table.scene(Phase::Commit);
        assert_eq!(commit.last_at_ms(), 5 * STEP_MS);
    }

    #[test]
    fn test_remap_rotates_nodes_and_keeps_client() {
        let table = SceneTable::standard(4);

        let request = table.scene_for_leader(Phase::Request, 2, 4);
        let msg = &request.steps[0].messages[0];
        assert_eq!(msg.from, Endpoint::Client);
        assert_eq!(msg.to, Endpoint::Node(2));

        let pre_prepare = table.scene_for_leader(Phase::PrePrepare, 3, 4);
        let targets: Vec<_> = pre_prepare.steps[0].messages.iter().map(|m| m.to).collect();
        assert!(pre_prepare.steps[0].messages.iter().all(|m| m.from == Endpoint::Node(3)));
        assert_eq!(targets, vec![Endpoint::Node(0), Endpoint::Node(1), Endpoint::Node(2)]);
    }

    #[test]
    fn test_remap_identity_for_leader_zero() {
        let scene = SceneTable::standard(4).scene(Phase::Commit);
        assert_eq!(scene.remap(0, 4), scene);
    }

    #[test]
    fn test_missing_phase_is_empty() {
        let table = SceneTable::new([Scene::empty(Phase::Prepare)]);
        let reply = table.scene(Phase::Reply);
        assert!(reply.steps.is_empty());
        assert_eq!(reply.last_at_ms(), 0);
        assert_eq!(reply.opening_narration(), "");
    }

    #[test]
    fn test_json_table_loading() {
        let json = r#"{
            "scenes": {
                "pre-prepare": {
                    "phase": "pre-prepare",
                    "steps": [
                        {"at_ms": 0, "narration": "propose", "messages": [
                            {"id": "pp-1", "from": 0, "to": 1, "kind": "pre-prepare", "payload": "v"}
                        ]}
                    ]
                }
            }
        }"#;

        let table = SceneTable::from_json(json).unwrap();
        let scene = table.scene(Phase::PrePrepare);
        assert_eq!(scene.opening_narration(), "propose");
        assert_eq!(scene.steps[0].messages[0].to, Endpoint::Node(1));

        let again = SceneTable::from_json(&table.to_json().unwrap()).unwrap();
        assert_eq!(again, table);
    }
}
