//! Event reducer: applies one [EventRecord] to a [SessionState] and lists the remote writes
//! the change implies.
//!
//! Every event kind is handled by one arm of an exhaustive match. Unknown kinds are no-ops;
//! `custom_*` kinds become custom trace entries on the system node. The reducer never
//! fails: missing or ill-typed payload fields are skipped.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{instrument, trace};

use crate::types::{
  EventKind, EventRecord, ExecutionNode, Health, NodeStateRecord, NodeStatus, ReflectionRecord,
  SYSTEM_NODE, ScoreRecord, SessionPatch, SessionState, TraceEntry, TraceKind,
};

/// Message of the trace entry recorded when the boost flag flips.
pub const BOOST_ACTIVATED: &str = "Boost activated";

/// Appended to the output of a cancelled run.
pub const CANCELLED_MARKER: &str = "[cancelled]";

/// A remote write implied by a state change. Routed by the synchronization queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
  /// Low-frequency session field change; written immediately.
  Patch(SessionPatch),
  /// Latest draft text; debounced.
  Draft(String),
  /// Latest diagram text; debounced.
  Diagram(String),
  /// Node status transition; written immediately.
  NodeState(NodeStateRecord),
  /// Append-only records; batched.
  Trace(TraceEntry),
  Score(ScoreRecord),
  Reflection(ReflectionRecord),
}

/// How a session left the streaming phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
  /// Stream closed normally or a run-end event was seen.
  Completed,
  /// Explicit abort.
  Cancelled,
  /// Transport failure; carries the user-visible reason.
  Failed(String),
}

impl Termination {
  /// Session status written to the remote store.
  pub fn status(&self) -> &'static str {
    match self {
      Termination::Completed => "completed",
      Termination::Cancelled => "cancelled",
      Termination::Failed(_) => "error",
    }
  }

  /// User-visible marker closing the output of a run that did not complete.
  pub fn marker(&self) -> Option<String> {
    match self {
      Termination::Completed => None,
      Termination::Cancelled => Some(CANCELLED_MARKER.to_string()),
      Termination::Failed(reason) => Some(format!("[error: {}]", reason)),
    }
  }

  /// Appends [Termination::marker] to `output`, separated by a blank line when non-empty.
  pub fn mark(&self, output: &mut String) {
    let Some(marker) = self.marker() else {
      return;
    };
    if !output.is_empty() {
      output.push_str("\n\n");
    }
    output.push_str(&marker);
  }
}

/// Applies `event` to `state`. Returns the implied remote writes in order.
#[instrument(level = "trace", skip(state, event), fields(kind = %event.kind))]
pub fn reduce(state: &mut SessionState, event: &EventRecord) -> Vec<Effect> {
  let now = event.received_at;
  let mut effects = Vec::new();
  match &event.kind {
    EventKind::RunStart => {
      let task = event.str_field("task").unwrap_or_default();
      let entry = TraceEntry::system(now, format!("Run started: {}", task))
        .with_payload(event.payload_value());
      record(state, &mut effects, entry);
    }
    EventKind::NodeStart => node_start(state, event, &mut effects),
    EventKind::NodeEnd => node_end(state, event, &mut effects),
    EventKind::Token => {
      if let Some(text) = event.str_field("content") {
        state.live_output.push_str(text);
      }
    }
    EventKind::DraftUpdate => {
      if let Some(draft) = event.str_field("content") {
        state.run.draft = draft.to_string();
        effects.push(Effect::Draft(draft.to_string()));
      }
    }
    EventKind::Progress => {
      let message = event.str_field("message").unwrap_or_default();
      let entry = TraceEntry::system(now, message).with_payload(event.payload_value());
      record(state, &mut effects, entry);
    }
    EventKind::Error => error(state, event, &mut effects),
    EventKind::RunEnd => {
      state.run.running = false;
      state.run.active_node = None;
      let status = event.str_field("status").unwrap_or("completed");
      let entry = TraceEntry::new(SYSTEM_NODE, TraceKind::End, now)
        .with_message(format!("Run {}", status))
        .with_payload(event.payload_value());
      record(state, &mut effects, entry);
    }
    EventKind::Metrics => {
      if let Some(tokens) = event.payload.get("tokens").and_then(Value::as_u64) {
        state.run.metrics.tokens = tokens;
      }
      if let Some(thoughts) = event.payload.get("thoughts").and_then(Value::as_u64) {
        state.run.metrics.thoughts = thoughts;
      }
    }
    EventKind::Thought => {
      state.run.metrics.thoughts += 1;
      let text = event.str_field("content").unwrap_or_default();
      record(state, &mut effects, TraceEntry::system(now, text));
    }
    EventKind::InteractionStart => {
      let id = event.str_field("interaction_id").unwrap_or("unknown");
      let entry = TraceEntry::system(now, format!("Interaction {}", id));
      record(state, &mut effects, entry);
    }
    EventKind::Custom(tag) => {
      let entry = TraceEntry::system(now, tag.clone()).with_payload(event.payload_value());
      record(state, &mut effects, entry);
    }
    EventKind::Unknown(tag) => {
      trace!(tag = %tag, "ignoring unrecognised event");
    }
  }
  effects
}

/// Forces the run into its terminal state after the stream stops.
///
/// Running is cleared and the active node released in every case. Cancellation and
/// failure also force health to critical, record a terminal trace entry and close the live
/// output with the termination marker.
#[instrument(level = "trace", skip(state))]
pub fn finalize(
  state: &mut SessionState,
  termination: &Termination,
  now: DateTime<Utc>,
) -> Vec<Effect> {
  let mut effects = Vec::new();
  state.run.running = false;
  state.run.active_node = None;
  state.run.ended = true;
  termination.mark(&mut state.live_output);
  match termination {
    Termination::Completed => {}
    Termination::Cancelled => {
      set_health(state, &mut effects, Health::Critical);
      let entry =
        TraceEntry::new(SYSTEM_NODE, TraceKind::End, now).with_message("Run cancelled");
      record(state, &mut effects, entry);
    }
    Termination::Failed(reason) => {
      set_health(state, &mut effects, Health::Critical);
      let entry =
        TraceEntry::new(SYSTEM_NODE, TraceKind::Error, now).with_message(reason.clone());
      record(state, &mut effects, entry);
    }
  }
  effects.push(Effect::Patch(SessionPatch::status(termination.status())));
  effects
}

fn node_start(state: &mut SessionState, event: &EventRecord, effects: &mut Vec<Effect>) {
  let Some(id) = event.node_name() else {
    trace!("node_start without a node name");
    return;
  };
  let task = event.str_field("task").map(str::to_string);
  let node = state.node_mut(id);
  node.start(event.received_at);
  if task.is_some() {
    node.task = task.clone();
  }
  let record_for_remote = node_state_record(node);
  state.run.active_node = Some(id.to_string());
  effects.push(Effect::NodeState(record_for_remote));

  let mut entry = TraceEntry::new(id, TraceKind::Start, event.received_at);
  if let Some(task) = task {
    entry = entry.with_message(task);
  }
  record(state, effects, entry);
}

fn node_end(state: &mut SessionState, event: &EventRecord, effects: &mut Vec<Effect>) {
  let Some(id) = event.node_name() else {
    trace!("node_end without a node name");
    return;
  };
  let now = event.received_at;
  let output = event.payload.get("output").cloned().unwrap_or(Value::Null);
  let node = state.node_mut(id);
  let duration_ms = node.finish(NodeStatus::Success, now, output.clone());
  let record_for_remote = node_state_record(node);
  if state.run.active_node.as_deref() == Some(id) {
    state.run.active_node = None;
  }
  effects.push(Effect::NodeState(record_for_remote));
  recompute_completed(state);

  if let Value::Object(fields) = &output {
    apply_node_output(state, id, fields, now, effects);
  }

  let entry = TraceEntry::new(id, TraceKind::End, now)
    .with_duration(duration_ms)
    .with_payload(output);
  record(state, effects, entry);
}

/// Effects of the optional fields of a node-end output.
fn apply_node_output(
  state: &mut SessionState,
  id: &str,
  fields: &Map<String, Value>,
  now: DateTime<Utc>,
  effects: &mut Vec<Effect>,
) {
  if let Some(iteration) = fields.get("iteration").and_then(Value::as_u64)
    && state.run.advance_iteration(iteration)
  {
    effects.push(Effect::Patch(SessionPatch::iteration(state.run.iteration)));
  }

  if let Some(last) = fields
    .get("scores")
    .and_then(Value::as_array)
    .and_then(|scores| scores.last())
    .and_then(Value::as_f64)
    && state.run.record_score(last)
  {
    effects.push(Effect::Score(ScoreRecord {
      value: last,
      iteration: state.run.iteration,
    }));
  }

  let draft = fields
    .get("current_draft")
    .or_else(|| fields.get("draft"))
    .and_then(Value::as_str);
  if let Some(draft) = draft {
    state.run.draft = draft.to_string();
    effects.push(Effect::Draft(draft.to_string()));
  }

  if let Some(diagram) = fields.get("diagram").and_then(Value::as_str) {
    state.run.diagram = diagram.to_string();
    effects.push(Effect::Diagram(diagram.to_string()));
  }

  if let Some(health) = fields
    .get("global_health")
    .and_then(Value::as_str)
    .and_then(Health::parse)
  {
    set_health(state, effects, health);
  }

  let boost = fields.get("is_boosted").and_then(Value::as_bool) == Some(true);
  if boost && !state.run.boosted {
    state.run.boosted = true;
    effects.push(Effect::Patch(SessionPatch::boosted(true)));
    let entry = TraceEntry::new(id, TraceKind::Custom, now).with_message(BOOST_ACTIVATED);
    record(state, effects, entry);
  }

  if let Some(memories) = fields.get("reflection_memories").and_then(Value::as_array) {
    for memory in memories {
      let Some(iteration) = memory.get("iteration").and_then(Value::as_u64) else {
        continue;
      };
      if state
        .last_reflection_iteration
        .is_some_and(|last| iteration <= last)
      {
        continue;
      }
      state.last_reflection_iteration = Some(iteration);
      effects.push(Effect::Reflection(ReflectionRecord {
        iteration,
        score: memory.get("score").and_then(Value::as_f64),
        improvement_suggestion: memory
          .get("improvement_suggestion")
          .and_then(Value::as_str)
          .map(str::to_string),
        reflection: memory
          .get("reflection")
          .and_then(Value::as_str)
          .map(str::to_string),
      }));
    }
  }
}

fn error(state: &mut SessionState, event: &EventRecord, effects: &mut Vec<Effect>) {
  let now = event.received_at;
  set_health(state, effects, Health::Critical);
  state.run.metrics.errors += 1;

  let mut duration_ms = None;
  let node_id = match event.node_name() {
    Some(id) => {
      let node = state.node_mut(id);
      duration_ms = node.finish(NodeStatus::Error, now, event.payload_value());
      let record_for_remote = node_state_record(node);
      if state.run.active_node.as_deref() == Some(id) {
        state.run.active_node = None;
      }
      effects.push(Effect::NodeState(record_for_remote));
      recompute_completed(state);
      id
    }
    None => SYSTEM_NODE,
  };

  let mut entry = TraceEntry::new(node_id, TraceKind::Error, now)
    .with_duration(duration_ms)
    .with_payload(event.payload_value());
  if let Some(message) = event.str_field("message") {
    entry = entry.with_message(message);
  }
  record(state, effects, entry);
}

fn set_health(state: &mut SessionState, effects: &mut Vec<Effect>, health: Health) {
  if state.run.health != health {
    state.run.health = health;
    effects.push(Effect::Patch(SessionPatch::health(health)));
  }
}

fn recompute_completed(state: &mut SessionState) {
  state.run.metrics.nodes_completed = state.completed_count();
}

fn node_state_record(node: &ExecutionNode) -> NodeStateRecord {
  NodeStateRecord {
    node_id: node.id.clone(),
    status: node.status,
    task: node.task.clone(),
    output: node.output.clone(),
  }
}

/// Appends `entry` to the trace list and queues its remote copy.
fn record(state: &mut SessionState, effects: &mut Vec<Effect>, entry: TraceEntry) {
  effects.push(Effect::Trace(entry.clone()));
  state.traces.push(entry);
}
