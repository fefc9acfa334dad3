//! Status of one observed workflow stage.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status of one observed workflow stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
  #[default]
  Pending,
  Running,
  Success,
  Error,
  Skipped,
}

impl NodeStatus {
  /// True for statuses a node can only leave by being started again.
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      NodeStatus::Success | NodeStatus::Error | NodeStatus::Skipped
    )
  }

  /// True for the statuses counted by `metrics.nodes_completed`.
  pub fn counts_as_completed(self) -> bool {
    matches!(self, NodeStatus::Success | NodeStatus::Error)
  }
}

impl fmt::Display for NodeStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      NodeStatus::Pending => write!(f, "pending"),
      NodeStatus::Running => write!(f, "running"),
      NodeStatus::Success => write!(f, "success"),
      NodeStatus::Error => write!(f, "error"),
      NodeStatus::Skipped => write!(f, "skipped"),
    }
  }
}
