//! Journal entry types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Payload;

/// Kind of a journal event, stored as its dotted name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    Begin,
    MovePlanned,
    MoveDone,
    MoveSkipped,
    UndoDone,
    StepDone,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Begin => "begin",
            Self::MovePlanned => "move.planned",
            Self::MoveDone => "move.done",
            Self::MoveSkipped => "move.skipped",
            Self::UndoDone => "undo.done",
            Self::StepDone => "step.done",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for EventKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "begin" => Self::Begin,
            "move.planned" => Self::MovePlanned,
            "move.done" => Self::MoveDone,
            "move.skipped" => Self::MoveSkipped,
            "undo.done" => Self::UndoDone,
            "step.done" => Self::StepDone,
            _ => Self::Other(name),
        }
    }
}

impl From<&str> for EventKind {
    fn from(name: &str) -> Self {
        Self::from(name.to_string())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of an operation's journal file. Never rewritten once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub ts: DateTime<Utc>,
    pub op_id: String,
    pub event: EventKind,
    #[serde(default)]
    pub payload: Payload,
}

impl JournalEntry {
    pub fn new(op_id: impl Into<String>, event: EventKind, payload: Payload) -> Self {
        Self {
            ts: Utc::now(),
            op_id: op_id.into(),
            event,
            payload,
        }
    }

    /// String field from the payload
    pub fn field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}
