//! DTOs exchanged with the remote store: the session record, patches and child records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Health, NodeStatus, TraceEntry, TraceKind};

/// Arguments for creating a session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSession {
  pub name: String,
  pub task: String,
  /// Backend mode label (e.g. "langgraph").
  pub backend: String,
  pub max_iterations: u32,
}

impl NewSession {
  /// Session name derived from the task: first line, at most 50 characters.
  pub fn for_task(task: &str, backend: impl Into<String>, max_iterations: u32) -> Self {
    let first_line = task.lines().next().unwrap_or_default().trim();
    let name: String = first_line.chars().take(50).collect();
    Self {
      name: if name.is_empty() {
        "Untitled run".to_string()
      } else {
        name
      },
      task: task.to_string(),
      backend: backend.into(),
      max_iterations,
    }
  }
}

/// The remote view of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
  pub id: String,
  pub name: String,
  pub task: String,
  pub backend: String,
  pub max_iterations: u32,
  pub status: String,
  pub iteration: u64,
  pub draft: String,
  pub diagram: String,
  pub health: Health,
  pub boosted: bool,
  pub created_at: DateTime<Utc>,
}

impl SessionRecord {
  pub fn new(id: impl Into<String>, new: NewSession, created_at: DateTime<Utc>) -> Self {
    Self {
      id: id.into(),
      name: new.name,
      task: new.task,
      backend: new.backend,
      max_iterations: new.max_iterations,
      status: "created".to_string(),
      iteration: 0,
      draft: String::new(),
      diagram: String::new(),
      health: Health::Healthy,
      boosted: false,
      created_at,
    }
  }

  /// Applies the present fields of `patch`.
  pub fn apply(&mut self, patch: &SessionPatch) {
    if let Some(status) = &patch.status {
      self.status = status.clone();
    }
    if let Some(iteration) = patch.iteration {
      self.iteration = iteration;
    }
    if let Some(draft) = &patch.draft {
      self.draft = draft.clone();
    }
    if let Some(diagram) = &patch.diagram {
      self.diagram = diagram.clone();
    }
    if let Some(health) = patch.health {
      self.health = health;
    }
    if let Some(boosted) = patch.boosted {
      self.boosted = boosted;
    }
  }
}

/// Partial update of a session record; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub iteration: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub draft: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub diagram: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub health: Option<Health>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub boosted: Option<bool>,
}

impl SessionPatch {
  pub fn status(status: impl Into<String>) -> Self {
    Self {
      status: Some(status.into()),
      ..Self::default()
    }
  }

  pub fn iteration(iteration: u64) -> Self {
    Self {
      iteration: Some(iteration),
      ..Self::default()
    }
  }

  pub fn draft(draft: impl Into<String>) -> Self {
    Self {
      draft: Some(draft.into()),
      ..Self::default()
    }
  }

  pub fn diagram(diagram: impl Into<String>) -> Self {
    Self {
      diagram: Some(diagram.into()),
      ..Self::default()
    }
  }

  pub fn health(health: Health) -> Self {
    Self {
      health: Some(health),
      ..Self::default()
    }
  }

  pub fn boosted(boosted: bool) -> Self {
    Self {
      boosted: Some(boosted),
      ..Self::default()
    }
  }
}

/// Chat-style message attached to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
  pub role: String,
  pub content: String,
  pub metadata: Value,
}

/// Remote copy of a [TraceEntry].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
  pub node_id: String,
  pub kind: TraceKind,
  pub message: Option<String>,
  pub payload: Option<Value>,
  pub duration_ms: Option<i64>,
}

impl From<&TraceEntry> for TraceRecord {
  fn from(entry: &TraceEntry) -> Self {
    Self {
      node_id: entry.node_id.clone(),
      kind: entry.kind,
      message: entry.message.clone(),
      payload: entry.payload.clone(),
      duration_ms: entry.duration_ms,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
  pub value: f64,
  pub iteration: u64,
}

/// Lesson extracted by the workflow's reflection stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionRecord {
  pub iteration: u64,
  pub score: Option<f64>,
  pub improvement_suggestion: Option<String>,
  pub reflection: Option<String>,
}

/// Latest known status of one node; upserted by node id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStateRecord {
  pub node_id: String,
  pub status: NodeStatus,
  pub task: Option<String>,
  pub output: Option<Value>,
}

/// Append-only child record of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "record_type")]
pub enum ChildRecord {
  Message(MessageRecord),
  Trace(TraceRecord),
  Score(ScoreRecord),
  Reflection(ReflectionRecord),
}
