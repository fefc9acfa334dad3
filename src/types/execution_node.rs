//! One stage of the observed workflow and its status transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::NodeStatus;

/// One stage of the observed workflow.
///
/// Created implicitly (as [NodeStatus::Pending]) the first time an event names it. Only the
/// reducer mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionNode {
  /// Stable node identifier (e.g. "judge").
  pub id: String,
  pub status: NodeStatus,
  /// Set on every transition into running; never cleared afterwards.
  pub started_at: Option<DateTime<Utc>>,
  /// Set on transition into a terminal status; `None` while running.
  pub ended_at: Option<DateTime<Utc>>,
  /// Output of the most recent terminal transition.
  pub output: Option<Value>,
  /// Task description attached by the workflow; survives status transitions.
  pub task: Option<String>,
}

impl ExecutionNode {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      status: NodeStatus::Pending,
      started_at: None,
      ended_at: None,
      output: None,
      task: None,
    }
  }

  /// Transition into running at `at`.
  pub fn start(&mut self, at: DateTime<Utc>) {
    self.status = NodeStatus::Running;
    self.started_at = Some(at);
    self.ended_at = None;
  }

  /// Transition into a terminal `status` at `at`, replacing the stored output.
  ///
  /// Returns the run duration in milliseconds when the node has a start time.
  pub fn finish(&mut self, status: NodeStatus, at: DateTime<Utc>, output: Value) -> Option<i64> {
    self.status = status;
    self.ended_at = Some(at);
    self.output = Some(output);
    self
      .started_at
      .map(|started| (at - started).num_milliseconds().max(0))
  }
}
