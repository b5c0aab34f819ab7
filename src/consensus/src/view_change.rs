//! View change and leader rotation

use crate::{state::Node, state::NodeRole, NodeIndex, ViewNumber};
use serde::{Deserialize, Serialize};

/// Current view and the leader it designates (`view mod n`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    pub view: ViewNumber,
    pub leader_id: NodeIndex,
}

impl ViewState {
    pub fn new(view: ViewNumber, n: usize) -> Self {
        Self {
            view,
            leader_id: calculate_leader(view, n),
        }
    }

    /// Advance to the next view, returning the new leader
    pub fn rotate(&mut self, n: usize) -> NodeIndex {
        self.view += 1;
        self.leader_id = calculate_leader(self.view, n);
        self.leader_id
    }

    /// Relabel node roles for the current leader
    pub fn assign_roles(&self, nodes: &mut [Node]) {
        for node in nodes {
            node.role = if node.id == self.leader_id {
                NodeRole::Leader
            } else {
                NodeRole::Replica
            };
        }
    }
}

/// Leader for `view` in a network of `n` nodes
pub fn calculate_leader(view: ViewNumber, n: usize) -> NodeIndex {
    if n == 0 {
        return 0;
    }
    (view % n as ViewNumber) as NodeIndex
}
