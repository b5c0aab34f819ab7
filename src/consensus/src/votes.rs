//! Vote aggregation: derives per-node PREPARE/COMMIT counts and status

use crate::{
    clock::Phase,
    message::{MessageKind, TimelineMessage},
    state::{Node, NodeStatus, NodeVoteStats, QuorumParams},
    NodeIndex,
};
use serde::Serialize;
use std::collections::BTreeSet;

/// Recompute vote stats for every node from the timeline.
///
/// Only messages whose payload equals `expected_payload` and that are not
/// conflicting are credited. A node that broadcasts a matching PREPARE or
/// COMMIT is credited its own vote once, regardless of how many recipients
/// the broadcast had. Messages addressed outside `[0, n)` are skipped.
pub fn compute_stats(
    timeline: &[TimelineMessage],
    expected_payload: &str,
    phase: Phase,
    quorum: &QuorumParams,
    leader_id: NodeIndex,
) -> Vec<NodeVoteStats> {
    let n = quorum.n;
    let mut stats = vec![NodeVoteStats::default(); n];
    let mut self_prepare: BTreeSet<NodeIndex> = BTreeSet::new();
    let mut self_commit: BTreeSet<NodeIndex> = BTreeSet::new();

    // The leader originates the value
    if let Some(leader) = stats.get_mut(leader_id) {
        leader.proposed = true;
    }

    for msg in timeline {
        let Some(to) = msg.to().node_within(n) else {
            continue;
        };
        if !msg.matches(expected_payload) {
            continue;
        }
        let sender = msg.from().node_within(n);

        match msg.kind() {
            MessageKind::PrePrepare => stats[to].proposed = true,
            MessageKind::Prepare => {
                stats[to].prepare += 1;
                if let Some(from) = sender {
                    self_prepare.insert(from);
                    stats[from].proposed = true;
                }
            }
            MessageKind::Commit => {
                stats[to].commit += 1;
                if let Some(from) = sender {
                    self_commit.insert(from);
                }
            }
            MessageKind::Request | MessageKind::Reply => {}
        }
    }

    for id in self_prepare {
        stats[id].prepare += 1;
    }
    for id in self_commit {
        stats[id].commit += 1;
    }

    let needed = quorum.needed();
    for st in &mut stats {
        st.status = derive_status(st, phase, needed);
    }

    stats
}

fn derive_status(st: &NodeVoteStats, phase: Phase, needed: usize) -> NodeStatus {
    let proposed = if st.proposed { NodeStatus::Proposed } else { NodeStatus::Idle };
    match phase {
        Phase::Reply => NodeStatus::Committed,
        Phase::Commit if st.commit >= needed => NodeStatus::Committed,
        Phase::Commit | Phase::Prepare if st.prepare >= needed => NodeStatus::Prepared,
        Phase::Commit | Phase::Prepare | Phase::PrePrepare | Phase::Request => proposed,
    }
}

/// Progress toward the 2f+1 threshold for the active voting phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuorumProgress {
    pub kind: MessageKind,
    /// Smallest matching vote count among non-faulty nodes
    pub collected: usize,
    pub needed: usize,
}

impl QuorumProgress {
    pub fn reached(&self) -> bool {
        self.collected >= self.needed
    }

    /// Completion percentage, capped at 100
    pub fn percent(&self) -> u8 {
        if self.needed == 0 {
            return 100;
        }
        (self.collected.min(self.needed) * 100 / self.needed) as u8
    }
}

/// Quorum progress of healthy nodes; `None` outside Prepare and Commit
pub fn quorum_progress(
    stats: &[NodeVoteStats],
    nodes: &[Node],
    phase: Phase,
    quorum: &QuorumParams,
) -> Option<QuorumProgress> {
    let kind = match phase {
        Phase::Prepare => MessageKind::Prepare,
        Phase::Commit => MessageKind::Commit,
        Phase::Request | Phase::PrePrepare | Phase::Reply => return None,
    };

    let collected = stats
        .iter()
        .zip(nodes)
        .filter(|(_, node)| !node.is_faulty())
        .map(|(st, _)| match kind {
            MessageKind::Commit => st.commit,
            _ => st.prepare,
        })
        .min()
        .unwrap_or(0);

    Some(QuorumProgress {
        kind,
        collected,
        needed: quorum.needed(),
    })
}
