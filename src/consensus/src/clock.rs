//! Logical clock and phase ordering

use crate::{error::ConsensusError, Millis};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Scripted stages of one consensus round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Request,
    PrePrepare,
    Prepare,
    Commit,
    Reply,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Request,
        Phase::PrePrepare,
        Phase::Prepare,
        Phase::Commit,
        Phase::Reply,
    ];

    /// Following phase within a round; `None` after Reply
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Request => Some(Phase::PrePrepare),
            Phase::PrePrepare => Some(Phase::Prepare),
            Phase::Prepare => Some(Phase::Commit),
            Phase::Commit => Some(Phase::Reply),
            Phase::Reply => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Request => "request",
            Phase::PrePrepare => "pre-prepare",
            Phase::Prepare => "prepare",
            Phase::Commit => "commit",
            Phase::Reply => "reply",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = ConsensusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| ConsensusError::UnknownPhase(s.to_string()))
    }
}

/// Scheduled automatic transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PendingTransition {
    NextPhase { phase: Phase, due_at: Millis },
    NextRound { due_at: Millis },
}

impl PendingTransition {
    pub fn due_at(&self) -> Millis {
        match self {
            PendingTransition::NextPhase { due_at, .. } | PendingTransition::NextRound { due_at } => *due_at,
        }
    }
}

/// Phase-local replay window.
///
/// `after` is the last local time already replayed (exclusive lower bound);
/// `None` means nothing was replayed yet in this phase, so `at_ms = 0` is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalWindow {
    pub after: Option<Millis>,
    pub through: Millis,
}

impl LocalWindow {
    pub fn contains(&self, at_ms: Millis) -> bool {
        at_ms <= self.through && self.after.map_or(true, |after| at_ms > after)
    }
}

/// Monotonic simulation clock with the active phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Clock {
    pub t: Millis,
    pub phase: Phase,
    pub phase_start: Millis,
    pub playing: bool,
    #[serde(skip)]
    replayed_through: Option<Millis>,
}

impl Clock {
    pub fn new(phase: Phase) -> Self {
        Self {
            t: 0,
            phase,
            phase_start: 0,
            playing: false,
            replayed_through: None,
        }
    }

    /// Window covering the advance from `t` to `next`, relative to `phase_start`
    pub fn window_to(&self, next: Millis) -> LocalWindow {
        LocalWindow {
            after: self.replayed_through,
            through: next.saturating_sub(self.phase_start),
        }
    }

    /// Time elapsed in the current phase
    pub fn local(&self) -> Millis {
        self.t - self.phase_start
    }

    /// Commit a replayed window and move the clock to `next`
    pub fn advance(&mut self, next: Millis, window: LocalWindow) {
        self.t = next;
        self.replayed_through = Some(window.through);
    }

    /// Start `phase` at the current time
    pub fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.phase_start = self.t;
        self.replayed_through = None;
    }

    /// Rewind to `t = 0` in `phase`
    pub fn rewind(&mut self, phase: Phase) {
        self.t = 0;
        self.enter(phase);
        self.playing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_from_str() {
        assert_eq!("pre-prepare".parse::<Phase>().unwrap(), Phase::PrePrepare);
        assert_eq!("Commit".parse::<Phase>().unwrap(), Phase::Commit);
        assert!("checkpoint".parse::<Phase>().is_err());
    }

    #[test]
    fn test_phase_order() {
        let mut phase = Phase::Request;
        let mut visited = vec![phase];
        while let Some(next) = phase.next() {
            visited.push(next);
            phase = next;
        }
        assert_eq!(visited, Phase::ALL.to_vec());
    }

    #[test]
    fn test_first_window_includes_zero() {
        let clock = Clock::new(Phase::Prepare);
        let window = clock.window_to(0);
        assert!(window.contains(0));
        assert!(!window.contains(1));
    }

    #[test]
    fn test_boundary_replayed_once() {
        let mut clock = Clock::new(Phase::Prepare);
        let first = clock.window_to(1200);
        assert!(first.contains(1200));
        clock.advance(1200, first);

        let second = clock.window_to(1500);
        assert!(!second.contains(1200));
        assert!(second.contains(1500));
    }

    #[test]
    fn test_enter_resets_local_time() {
        let mut clock = Clock::new(Phase::Request);
        let window = clock.window_to(900);
        clock.advance(900, window);
        clock.enter(Phase::PrePrepare);

        assert_eq!(clock.phase_start, 900);
        assert_eq!(clock.local(), 0);
        assert!(clock.window_to(1000).contains(0));
    }
}
