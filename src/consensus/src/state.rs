//! Node and vote state

use crate::NodeIndex;
use serde::{Deserialize, Serialize};

/// Role of a node in the current view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Leader,
    Replica,
}

/// Fault annotation of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Normal,
    Faulty,
}

impl NodeState {
    pub fn toggled(self) -> Self {
        match self {
            NodeState::Normal => NodeState::Faulty,
            NodeState::Faulty => NodeState::Normal,
        }
    }
}

/// A simulated replica. The node set is fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeIndex,
    pub role: NodeRole,
    pub state: NodeState,
}

impl Node {
    pub fn new(id: NodeIndex, leader_id: NodeIndex) -> Self {
        Self {
            id,
            role: if id == leader_id { NodeRole::Leader } else { NodeRole::Replica },
            state: NodeState::Normal,
        }
    }

    pub fn is_faulty(&self) -> bool {
        self.state == NodeState::Faulty
    }

    pub fn is_leader(&self) -> bool {
        self.role == NodeRole::Leader
    }
}

/// Consensus status derived for one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// No matching proposal seen
    Idle,
    /// Holds the proposed value
    Proposed,
    /// Collected 2f+1 matching PREPARE votes
    Prepared,
    /// Collected 2f+1 matching COMMIT votes
    Committed,
}

/// Per-node vote counters, always recomputed from the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeVoteStats {
    pub prepare: usize,
    pub commit: usize,
    pub proposed: bool,
    pub status: NodeStatus,
}

impl Default for NodeVoteStats {
    fn default() -> Self {
        Self {
            prepare: 0,
            commit: 0,
            proposed: false,
            status: NodeStatus::Idle,
        }
    }
}

/// Network size and fault tolerance (`n = 3f + 1`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumParams {
    pub n: usize,
    pub f: usize,
}

impl QuorumParams {
    pub fn new(n: usize, f: usize) -> Self {
        Self { n, f }
    }

    /// Largest `f` tolerated by `n` nodes
    pub fn for_nodes(n: usize) -> Self {
        Self { n, f: n.saturating_sub(1) / 3 }
    }

    /// Quorum threshold `2f + 1`
    pub fn needed(&self) -> usize {
        2 * self.f + 1
    }
}
