//! Aggregate derived state for one session.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Global health of the observed run (last write wins).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
  #[default]
  Healthy,
  Degraded,
  Critical,
}

impl Health {
  /// Parses the wire name; unknown names yield `None`.
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "healthy" => Some(Health::Healthy),
      "degraded" => Some(Health::Degraded),
      "critical" => Some(Health::Critical),
      _ => None,
    }
  }
}

impl fmt::Display for Health {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Health::Healthy => write!(f, "healthy"),
      Health::Degraded => write!(f, "degraded"),
      Health::Critical => write!(f, "critical"),
    }
  }
}

/// Counters shown alongside the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
  pub tokens: u64,
  pub thoughts: u64,
  /// Only ever increases within a run.
  pub errors: u64,
  /// Count of nodes whose status is success or error; always recomputed.
  pub nodes_completed: u64,
  pub nodes_total: u64,
}

/// Aggregate root for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
  pub running: bool,
  /// At most one node is active at a time.
  pub active_node: Option<String>,
  /// One entry per scoring node-end, in arrival order.
  pub scores: Vec<f64>,
  /// One-way flip within a run.
  pub boosted: bool,
  pub draft: String,
  pub diagram: String,
  pub health: Health,
  /// Monotonically non-decreasing within a run.
  pub iteration: u64,
  pub metrics: Metrics,
  /// Set once the owning session reached a terminal state.
  pub ended: bool,
}

impl RunState {
  /// Idle state with zeroed counters. A run marks itself running once it starts.
  pub fn fresh(nodes_total: u64) -> Self {
    Self {
      metrics: Metrics {
        nodes_total,
        ..Metrics::default()
      },
      ..Self::default()
    }
  }

  /// Stores `iteration` unless it is lower than the current value. Returns true when the
  /// stored value changed.
  pub fn advance_iteration(&mut self, iteration: u64) -> bool {
    if iteration <= self.iteration {
      return false;
    }
    self.iteration = iteration;
    true
  }

  /// Appends a score; non-finite values are ignored. Returns true when appended.
  pub fn record_score(&mut self, value: f64) -> bool {
    if !value.is_finite() {
      return false;
    }
    self.scores.push(value);
    true
  }
}
