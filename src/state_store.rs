//! Observable owner of one [SessionState].
//!
//! All mutation goes through the reducer; after every applied event the store publishes a
//! fresh [RunSnapshot] on a watch channel so observers never see a half-applied event.

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, instrument};

use crate::reducer::{self, Effect, Termination};
use crate::types::{DEFAULT_TRACE_CAP, EventRecord, NODE_CATALOG, RunSnapshot, SessionState};

/// Holds the session state and broadcasts snapshots of it.
#[derive(Debug)]
pub struct StateStore {
  trace_cap: usize,
  state: SessionState,
  tx: watch::Sender<RunSnapshot>,
}

impl StateStore {
  pub fn new(trace_cap: usize) -> Self {
    let state = SessionState::new(trace_cap, NODE_CATALOG.len() as u64);
    let (tx, _rx) = watch::channel(RunSnapshot::from(&state));
    Self {
      trace_cap,
      state,
      tx,
    }
  }

  /// Receiver that observes every published snapshot.
  pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
    self.tx.subscribe()
  }

  /// Replaces the state with a fresh idle session.
  #[instrument(level = "trace", skip(self))]
  pub fn reset(&mut self, nodes_total: u64) {
    self.state = SessionState::new(self.trace_cap, nodes_total);
    self.publish();
  }

  /// Marks the current session as running.
  pub fn begin(&mut self) {
    self.state.run.running = true;
    self.publish();
  }

  /// Applies one event and publishes the result.
  pub fn apply(&mut self, event: &EventRecord) -> Vec<Effect> {
    let effects = reducer::reduce(&mut self.state, event);
    self.publish();
    effects
  }

  /// Moves the run into its terminal state and publishes the result.
  pub fn finalize(&mut self, termination: &Termination, now: DateTime<Utc>) -> Vec<Effect> {
    let effects = reducer::finalize(&mut self.state, termination, now);
    self.publish();
    effects
  }

  /// Empties the in-memory trace list. Remote copies are untouched.
  pub fn clear_trace(&mut self) {
    debug!(entries = self.state.traces.len(), "clearing trace log");
    self.state.traces.clear();
    self.publish();
  }

  pub fn state(&self) -> &SessionState {
    &self.state
  }

  pub fn snapshot(&self) -> RunSnapshot {
    RunSnapshot::from(&self.state)
  }

  fn publish(&self) {
    self.tx.send_replace(RunSnapshot::from(&self.state));
  }
}

impl Default for StateStore {
  fn default() -> Self {
    Self::new(DEFAULT_TRACE_CAP)
  }
}
