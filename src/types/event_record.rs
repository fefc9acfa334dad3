//! One decoded unit of the inbound stream: kind tag, payload map, arrival time.

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Tag prefix of workflow-defined events that are recorded as custom system traces.
pub const CUSTOM_PREFIX: &str = "custom_";

/// Closed set of event kinds the reducer understands.
///
/// Any tag outside this set lands in [EventKind::Custom] (when it starts with
/// [CUSTOM_PREFIX]) or [EventKind::Unknown].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
  RunStart,
  NodeStart,
  NodeEnd,
  Token,
  DraftUpdate,
  Progress,
  Error,
  RunEnd,
  Metrics,
  Thought,
  InteractionStart,
  /// Full tag, including the prefix.
  Custom(String),
  Unknown(String),
}

impl EventKind {
  pub fn from_tag(tag: &str) -> Self {
    match tag {
      "run_start" => EventKind::RunStart,
      "node_start" => EventKind::NodeStart,
      "node_end" => EventKind::NodeEnd,
      "token" => EventKind::Token,
      "draft_update" => EventKind::DraftUpdate,
      "progress" => EventKind::Progress,
      "error" => EventKind::Error,
      "run_end" => EventKind::RunEnd,
      "metrics" => EventKind::Metrics,
      "thought" => EventKind::Thought,
      "interaction_start" => EventKind::InteractionStart,
      other if other.starts_with(CUSTOM_PREFIX) => EventKind::Custom(other.to_string()),
      other => EventKind::Unknown(other.to_string()),
    }
  }

  pub fn tag(&self) -> &str {
    match self {
      EventKind::RunStart => "run_start",
      EventKind::NodeStart => "node_start",
      EventKind::NodeEnd => "node_end",
      EventKind::Token => "token",
      EventKind::DraftUpdate => "draft_update",
      EventKind::Progress => "progress",
      EventKind::Error => "error",
      EventKind::RunEnd => "run_end",
      EventKind::Metrics => "metrics",
      EventKind::Thought => "thought",
      EventKind::InteractionStart => "interaction_start",
      EventKind::Custom(tag) | EventKind::Unknown(tag) => tag,
    }
  }
}

impl fmt::Display for EventKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.tag())
  }
}

/// One decoded event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
  pub kind: EventKind,
  pub payload: Map<String, Value>,
  /// Externally supplied arrival time; the reducer uses it as "now".
  pub received_at: DateTime<Utc>,
  /// Timestamp the producer stamped on the envelope, verbatim.
  pub source_timestamp: Option<String>,
}

impl EventRecord {
  pub fn new(kind: EventKind, payload: Map<String, Value>, received_at: DateTime<Utc>) -> Self {
    Self {
      kind,
      payload,
      received_at,
      source_timestamp: None,
    }
  }

  /// String field of the payload, if present and a string.
  pub fn str_field(&self, key: &str) -> Option<&str> {
    self.payload.get(key).and_then(Value::as_str)
  }

  /// Node the event refers to (`name`, falling back to `node`).
  pub fn node_name(&self) -> Option<&str> {
    self
      .str_field("name")
      .or_else(|| self.str_field("node"))
      .filter(|s| !s.is_empty())
  }

  /// Payload as a JSON value (for trace payloads).
  pub fn payload_value(&self) -> Value {
    Value::Object(self.payload.clone())
  }
}
