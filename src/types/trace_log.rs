//! Bounded, append-only trace list (oldest entries evicted first).

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::TraceEntry;

/// Default number of entries kept in memory.
pub const DEFAULT_TRACE_CAP: usize = 500;

/// Bounded trace list. Insertion order is preserved; once `cap` is reached each push drops
/// the oldest entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceLog {
  cap: usize,
  entries: VecDeque<TraceEntry>,
}

impl TraceLog {
  /// A cap of zero is treated as one.
  pub fn with_cap(cap: usize) -> Self {
    let cap = cap.max(1);
    Self {
      cap,
      entries: VecDeque::with_capacity(cap.min(DEFAULT_TRACE_CAP)),
    }
  }

  pub fn cap(&self) -> usize {
    self.cap
  }

  pub fn push(&mut self, entry: TraceEntry) {
    if self.entries.len() == self.cap {
      self.entries.pop_front();
    }
    self.entries.push_back(entry);
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn clear(&mut self) {
    self.entries.clear();
  }

  pub fn iter(&self) -> impl Iterator<Item = &TraceEntry> {
    self.entries.iter()
  }

  pub fn to_vec(&self) -> Vec<TraceEntry> {
    self.entries.iter().cloned().collect()
  }
}

impl Default for TraceLog {
  fn default() -> Self {
    Self::with_cap(DEFAULT_TRACE_CAP)
  }
}
