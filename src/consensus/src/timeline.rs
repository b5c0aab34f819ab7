//! Message timeline and narration log

use crate::{
    message::{Endpoint, TimelineMessage},
    retention::RetentionPolicy,
    Millis, NodeIndex,
};
use serde::{Deserialize, Serialize};

/// Emitted messages in emission order.
///
/// The timeline is append-only except for two sanctioned edits:
/// [`Timeline::annotate_conflicting`] (retroactive fault marking) and
/// [`Timeline::remove`] (a message dropped on request). Retention pruning
/// removes the oldest entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Timeline {
    messages: Vec<TimelineMessage>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = TimelineMessage>) {
        self.messages.extend(messages);
    }

    pub fn messages(&self) -> &[TimelineMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Mark every past non-conflicting message sent by `sender` as conflicting.
    ///
    /// A literal `"v"` payload is resolved against `expected_payload` before
    /// the asterisk is appended. Returns the number of rewritten entries.
    pub fn annotate_conflicting(&mut self, sender: NodeIndex, expected_payload: &str) -> usize {
        let mut rewritten = 0;
        for msg in self
            .messages
            .iter_mut()
            .filter(|m| m.from() == Endpoint::Node(sender) && !m.is_conflicting())
        {
            msg.mark_conflicting(expected_payload);
            rewritten += 1;
        }
        rewritten
    }

    /// Remove every entry carrying `message_id`, returning how many went.
    ///
    /// Script ids repeat each round, so earlier rounds' copies go too.
    pub fn remove(&mut self, message_id: &str) -> usize {
        let before = self.messages.len();
        self.messages.retain(|m| m.id() != message_id);
        before - self.messages.len()
    }

    pub fn prune(&mut self, policy: &RetentionPolicy, now: Millis) -> usize {
        policy.apply(&mut self.messages, now, |m| m.at())
    }
}

/// Timestamped narration/log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub t: Millis,
    pub text: String,
}

/// Bounded teaching log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EventLog {
    entries: Vec<LogEntry>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, t: Millis, text: impl Into<String>) {
        self.entries.push(LogEntry { t, text: text.into() });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn prune(&mut self, policy: &RetentionPolicy, now: Millis) -> usize {
        policy.apply(&mut self.entries, now, |e| e.t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageKind, ScriptedMessage};

    fn prepare(id: &str, from: usize, to: usize, payload: &str, at: Millis) -> TimelineMessage {
        let template = ScriptedMessage::new(id, Endpoint::Node(from), Endpoint::Node(to), MessageKind::Prepare, "v");
        TimelineMessage::new(&template, payload.to_string(), false, at)
    }

    #[test]
    fn test_annotate_only_sender_entries() {
        let mut timeline = Timeline::new();
        timeline.extend([
            prepare("pr-2-0", 2, 0, "+1", 0),
            prepare("pr-2-1", 2, 1, "+1", 0),
            prepare("pr-1-2", 1, 2, "+1", 0),
        ]);

        assert_eq!(timeline.annotate_conflicting(2, "+1"), 2);
        assert_eq!(timeline.messages()[0].payload(), "+1*");
        assert!(timeline.messages()[1].is_conflicting());
        assert!(!timeline.messages()[2].is_conflicting());

        // already conflicting entries are left alone
        assert_eq!(timeline.annotate_conflicting(2, "+1"), 0);
        assert_eq!(timeline.messages()[0].payload(), "+1*");
    }

    #[test]
    fn test_remove_by_id() {
        let mut timeline = Timeline::new();
        timeline.extend([
            prepare("a", 0, 1, "+1", 0),
            prepare("b", 0, 2, "+1", 0),
            prepare("a", 0, 1, "+2", 5000),
        ]);

        assert_eq!(timeline.remove("a"), 2);
        assert_eq!(timeline.remove("missing"), 0);
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.messages()[0].id(), "b");
    }

    #[test]
    fn test_log_prune() {
        let mut log = EventLog::new();
        log.push(0, "old");
        log.push(40_000, "new");

        assert_eq!(log.prune(&RetentionPolicy::log(), 40_000), 1);
        assert_eq!(log.last().map(|e| e.text.as_str()), Some("new"));
    }
}
