//! Message types for the scripted PBFT exchange

use crate::{Millis, NodeIndex};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder payload replaced by the round's expected payload at replay time
pub const VALUE_PLACEHOLDER: &str = "v";

/// Message endpoint: the external client or a node index.
///
/// Serialized as an integer where `-1` is the client, matching the scene
/// table format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Endpoint {
    Client,
    Node(NodeIndex),
}

impl Endpoint {
    /// Node index if this endpoint is a node inside `[0, n)`
    pub fn node_within(self, n: usize) -> Option<NodeIndex> {
        match self {
            Endpoint::Node(idx) if idx < n => Some(idx),
            _ => None,
        }
    }
}

impl TryFrom<i64> for Endpoint {
    type Error = String;

    fn try_from(raw: i64) -> std::result::Result<Self, Self::Error> {
        match raw {
            -1 => Ok(Endpoint::Client),
            idx if idx >= 0 => Ok(Endpoint::Node(idx as NodeIndex)),
            other => Err(format!("invalid endpoint {other}: expected -1 or a node index")),
        }
    }
}

impl From<Endpoint> for i64 {
    fn from(endpoint: Endpoint) -> Self {
        match endpoint {
            Endpoint::Client => -1,
            Endpoint::Node(idx) => idx as i64,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Client => write!(f, "client"),
            Endpoint::Node(idx) => write!(f, "n{idx}"),
        }
    }
}

/// PBFT message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    Request,
    PrePrepare,
    Prepare,
    Commit,
    Reply,
}

impl MessageKind {
    /// Log label, e.g. `[PRE-PREPARE]`
    pub fn label(self) -> &'static str {
        match self {
            MessageKind::Request => "[REQUEST]",
            MessageKind::PrePrepare => "[PRE-PREPARE]",
            MessageKind::Prepare => "[PREPARE]",
            MessageKind::Commit => "[COMMIT]",
            MessageKind::Reply => "[REPLY]",
        }
    }
}

/// Immutable message template from a scene
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedMessage {
    pub id: String,
    pub from: Endpoint,
    pub to: Endpoint,
    pub kind: MessageKind,
    pub payload: String,
    #[serde(default)]
    pub conflicting: bool,
}

impl ScriptedMessage {
    pub fn new(
        id: impl Into<String>,
        from: Endpoint,
        to: Endpoint,
        kind: MessageKind,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            from,
            to,
            kind,
            payload: payload.into(),
            conflicting: false,
        }
    }

    /// Payload with the `"v"` placeholder resolved against `expected`
    pub fn resolved_payload(&self, expected: &str) -> String {
        resolve_payload(&self.payload, expected)
    }
}

pub(crate) fn resolve_payload(payload: &str, expected: &str) -> String {
    if payload == VALUE_PLACEHOLDER {
        expected.to_string()
    } else {
        payload.to_string()
    }
}

/// Divergent payload used for messages sent by a faulty node
pub(crate) fn conflicting_payload(base: &str) -> String {
    format!("{base}*")
}

/// A scripted message materialized onto the timeline.
///
/// Identity fields (`id`, `from`, `to`, `kind`) are fixed at creation. Only
/// [`crate::Timeline::annotate_conflicting`] may rewrite `payload` and
/// `conflicting` afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineMessage {
    id: String,
    from: Endpoint,
    to: Endpoint,
    kind: MessageKind,
    payload: String,
    conflicting: bool,
    at: Millis,
}

impl TimelineMessage {
    pub fn new(
        template: &ScriptedMessage,
        payload: String,
        conflicting: bool,
        at: Millis,
    ) -> Self {
        Self {
            id: template.id.clone(),
            from: template.from,
            to: template.to,
            kind: template.kind,
            payload,
            conflicting,
            at,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn from(&self) -> Endpoint {
        self.from
    }

    pub fn to(&self) -> Endpoint {
        self.to
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn is_conflicting(&self) -> bool {
        self.conflicting
    }

    /// Emission time on the logical clock (jitter included)
    pub fn at(&self) -> Millis {
        self.at
    }

    /// Whether this message is a valid vote for `expected`
    pub fn matches(&self, expected: &str) -> bool {
        !self.conflicting && self.payload == expected
    }

    /// Short route description used in grouped log lines, e.g. `n0->n1(!)`
    pub fn route(&self) -> String {
        let marker = if self.conflicting { "(!)" } else { "" };
        format!("{}->{}{}", self.from, self.to, marker)
    }

    pub(crate) fn mark_conflicting(&mut self, expected: &str) {
        let base = resolve_payload(&self.payload, expected);
        self.payload = conflicting_payload(&base);
        self.conflicting = true;
    }
}

impl fmt::Display for TimelineMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = if self.conflicting { " (conflict)" } else { "" };
        write!(
            f,
            "{} {} -> {} payload={}{}",
            self.kind.label(),
            self.from,
            self.to,
            self.payload,
            tag
        )
    }
}
