//! Full in-memory state of one session: run aggregate, node map, trace list, live output.

use std::collections::HashMap;

use super::{ExecutionNode, RunState, TraceLog};

/// Everything the reducer reads and writes for one session.
#[derive(Debug, Clone)]
pub struct SessionState {
  pub run: RunState,
  pub nodes: HashMap<String, ExecutionNode>,
  pub traces: TraceLog,
  /// Concatenated `token` text of the in-progress assistant output.
  pub live_output: String,
  /// Highest reflection iteration already forwarded to the remote store.
  pub last_reflection_iteration: Option<u64>,
}

impl SessionState {
  pub fn new(trace_cap: usize, nodes_total: u64) -> Self {
    Self {
      run: RunState::fresh(nodes_total),
      nodes: HashMap::new(),
      traces: TraceLog::with_cap(trace_cap),
      live_output: String::new(),
      last_reflection_iteration: None,
    }
  }

  /// Node `id`, created as pending on first reference.
  pub fn node_mut(&mut self, id: &str) -> &mut ExecutionNode {
    self
      .nodes
      .entry(id.to_string())
      .or_insert_with(|| ExecutionNode::new(id))
  }

  /// Number of nodes whose status is success or error.
  pub fn completed_count(&self) -> u64 {
    self
      .nodes
      .values()
      .filter(|n| n.status.counts_as_completed())
      .count() as u64
  }
}
