//! Serializable point-in-time view of a session, published to observers and written to disk.

use serde::{Deserialize, Serialize};

use super::node_catalog::catalog_position;
use super::{ExecutionNode, RunState, SessionState, TraceEntry};

/// Point-in-time copy of a [SessionState].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
  pub run: RunState,
  /// Catalog stages first (in graph order), then other nodes by id.
  pub nodes: Vec<ExecutionNode>,
  /// Oldest first.
  pub traces: Vec<TraceEntry>,
  pub live_output: String,
}

impl RunSnapshot {
  pub fn node(&self, id: &str) -> Option<&ExecutionNode> {
    self.nodes.iter().find(|n| n.id == id)
  }
}

impl From<&SessionState> for RunSnapshot {
  fn from(state: &SessionState) -> Self {
    let mut nodes: Vec<ExecutionNode> = state.nodes.values().cloned().collect();
    nodes.sort_by(|a, b| {
      let pa = catalog_position(&a.id).unwrap_or(usize::MAX);
      let pb = catalog_position(&b.id).unwrap_or(usize::MAX);
      pa.cmp(&pb).then_with(|| a.id.cmp(&b.id))
    });
    Self {
      run: state.run.clone(),
      nodes,
      traces: state.traces.to_vec(),
      live_output: state.live_output.clone(),
    }
  }
}
