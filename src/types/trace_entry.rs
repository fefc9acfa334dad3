//! Immutable, timestamped record of something that happened to one node.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Node id used for entries that are not about a workflow stage.
pub const SYSTEM_NODE: &str = "system";

/// Kind of a [TraceEntry].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
  Start,
  End,
  Error,
  Output,
  Custom,
}

impl fmt::Display for TraceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TraceKind::Start => write!(f, "start"),
      TraceKind::End => write!(f, "end"),
      TraceKind::Error => write!(f, "error"),
      TraceKind::Output => write!(f, "output"),
      TraceKind::Custom => write!(f, "custom"),
    }
  }
}

/// One trace log entry. Never mutated after the reducer creates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
  pub id: Uuid,
  pub node_id: String,
  pub kind: TraceKind,
  pub at: DateTime<Utc>,
  pub message: Option<String>,
  pub duration_ms: Option<i64>,
  pub payload: Option<Value>,
}

impl TraceEntry {
  pub fn new(node_id: impl Into<String>, kind: TraceKind, at: DateTime<Utc>) -> Self {
    Self {
      id: Uuid::new_v4(),
      node_id: node_id.into(),
      kind,
      at,
      message: None,
      duration_ms: None,
      payload: None,
    }
  }

  /// Custom entry tagged to the synthetic [SYSTEM_NODE].
  pub fn system(at: DateTime<Utc>, message: impl Into<String>) -> Self {
    Self::new(SYSTEM_NODE, TraceKind::Custom, at).with_message(message)
  }

  pub fn with_message(mut self, message: impl Into<String>) -> Self {
    self.message = Some(message.into());
    self
  }

  pub fn with_duration(mut self, duration_ms: Option<i64>) -> Self {
    self.duration_ms = duration_ms;
    self
  }

  pub fn with_payload(mut self, payload: Value) -> Self {
    self.payload = Some(payload);
    self
  }
}
