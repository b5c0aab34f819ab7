//! Round lifecycle: value accumulation across consensus rounds

use serde::{Deserialize, Serialize};

/// Round counters and the value agreed so far.
///
/// Each round proposes `+next_increment`; completing it adds the increment
/// to `value`, so after round `k` the value is `k(k+1)/2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundState {
    pub round: u64,
    pub value: i64,
    pub next_increment: i64,
    /// Canonical payload honest nodes vote for this round, e.g. `"+3"`
    pub expected_payload: String,
    /// Whether this round's increment has been applied
    pub completed: bool,
}

impl RoundState {
    pub fn new() -> Self {
        Self {
            round: 1,
            value: 0,
            next_increment: 1,
            expected_payload: payload_for(1),
            completed: false,
        }
    }

    /// Apply the round's increment; returns the new value the first time only
    pub fn complete(&mut self) -> Option<i64> {
        if self.completed {
            return None;
        }
        self.value += self.next_increment;
        self.completed = true;
        Some(self.value)
    }

    /// Move to the next round with a fresh proposal
    pub fn advance(&mut self) {
        self.next_increment += 1;
        self.round += 1;
        self.expected_payload = payload_for(self.next_increment);
        self.completed = false;
    }
}

impl Default for RoundState {
    fn default() -> Self {
        Self::new()
    }
}

fn payload_for(increment: i64) -> String {
    format!("+{increment}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triangular_accumulation() {
        let mut round = RoundState::new();
        for k in 1..=5i64 {
            assert_eq!(round.expected_payload, format!("+{k}"));
            assert_eq!(round.complete(), Some(k * (k + 1) / 2));
            round.advance();
        }
        assert_eq!(round.round, 6);
        assert_eq!(round.next_increment, 6);
    }

    #[test]
    fn test_complete_applies_once() {
        let mut round = RoundState::new();
        assert_eq!(round.complete(), Some(1));
        assert_eq!(round.complete(), None);
        assert_eq!(round.value, 1);
    }
}
