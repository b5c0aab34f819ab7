//! Change notifications emitted by the engine

use crate::{clock::Phase, state::NodeState, Millis, NodeIndex, ViewNumber};
use serde::Serialize;

/// Capacity of the broadcast channel; slow subscribers observe `Lagged`
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Something observable changed in the simulation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SimulationEvent {
    Stepped { t: Millis },
    MessagesEmitted { t: Millis, count: usize },
    Narration { t: Millis, text: String },
    PhaseChanged { t: Millis, phase: Phase },
    RoundCompleted { round: u64, value: i64 },
    RoundStarted { round: u64, expected_payload: String },
    AwaitingRequest { round: u64 },
    NodeToggled { node: NodeIndex, state: NodeState },
    ViewChanged { view: ViewNumber, leader_id: NodeIndex },
    MessageDropped { message_id: String },
    Reset,
}
