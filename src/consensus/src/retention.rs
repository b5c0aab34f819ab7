//! Retention policy bounding timeline and log growth

use crate::Millis;
use serde::{Deserialize, Serialize};

/// Age and count bound for an append-mostly history.
///
/// Thresholds are generous relative to phase durations, so pruning never
/// touches messages that still count toward the active phase's quorum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Hard cap on retained entries (most recent kept)
    pub max_entries: usize,
    /// Entries older than this relative to the current time are dropped
    pub max_age_ms: Millis,
}

impl RetentionPolicy {
    pub const fn new(max_entries: usize, max_age_ms: Millis) -> Self {
        Self { max_entries, max_age_ms }
    }

    /// Default bound for timeline messages
    pub const fn timeline() -> Self {
        Self::new(500, 30_000)
    }

    /// Default bound for log entries
    pub const fn log() -> Self {
        Self::new(1000, 30_000)
    }

    pub fn is_expired(&self, stamp: Millis, now: Millis) -> bool {
        now.saturating_sub(stamp) > self.max_age_ms
    }

    /// Prune `entries` in place, returning how many were removed
    pub fn apply<T>(&self, entries: &mut Vec<T>, now: Millis, stamp: impl Fn(&T) -> Millis) -> usize {
        let before = entries.len();
        entries.retain(|entry| !self.is_expired(stamp(entry), now));
        if entries.len() > self.max_entries {
            let excess = entries.len() - self.max_entries;
            entries.drain(..excess);
        }
        before - entries.len()
    }
}
