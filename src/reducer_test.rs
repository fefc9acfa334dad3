//! Tests for `reduce` and `finalize`.

use chrono::{Duration, TimeZone, Utc};
use serde_json::{Value, json};

use crate::reducer::{BOOST_ACTIVATED, CANCELLED_MARKER, Effect, Termination, finalize, reduce};
use crate::types::{
  EventKind, EventRecord, Health, NodeStatus, SYSTEM_NODE, SessionPatch, SessionState, TraceKind,
};

fn ev(tag: &str, payload: Value) -> EventRecord {
  ev_at(tag, payload, 0)
}

fn ev_at(tag: &str, payload: Value, offset_ms: i64) -> EventRecord {
  let t0 = Utc.with_ymd_and_hms(2026, 2, 14, 10, 0, 0).unwrap();
  let payload = match payload {
    Value::Object(map) => map,
    _ => panic!("payload must be an object"),
  };
  EventRecord::new(
    EventKind::from_tag(tag),
    payload,
    t0 + Duration::milliseconds(offset_ms),
  )
}

fn state() -> SessionState {
  SessionState::new(500, 12)
}

fn apply_all(state: &mut SessionState, events: &[EventRecord]) -> Vec<Effect> {
  events.iter().flat_map(|e| reduce(state, e)).collect()
}

#[test]
fn scripted_run_produces_expected_state() {
  let mut s = state();
  apply_all(
    &mut s,
    &[
      ev_at("node_start", json!({"name": "data_processing"}), 0),
      ev_at(
        "node_end",
        json!({"name": "data_processing", "output": {"scores": [7.2]}}),
        10,
      ),
      ev_at("node_start", json!({"name": "judge"}), 20),
      ev_at(
        "node_end",
        json!({"name": "judge", "output": {"scores": [8.6], "iteration": 2, "is_boosted": true}}),
        30,
      ),
      ev_at("run_end", json!({"status": "completed"}), 40),
    ],
  );

  assert_eq!(s.run.scores, vec![7.2, 8.6]);
  assert_eq!(s.run.iteration, 2);
  assert!(s.run.boosted);
  assert!(!s.run.running);
  assert!(s.run.active_node.is_none());
  assert_eq!(s.nodes["data_processing"].status, NodeStatus::Success);
  assert_eq!(s.nodes["judge"].status, NodeStatus::Success);
  assert_eq!(s.run.metrics.nodes_completed, 2);

  let traces = s.traces.to_vec();
  let boosts = traces
    .iter()
    .filter(|t| t.message.as_deref() == Some(BOOST_ACTIVATED))
    .count();
  assert_eq!(boosts, 1);
  for node in ["data_processing", "judge"] {
    let starts = traces
      .iter()
      .filter(|t| t.node_id == node && t.kind == TraceKind::Start)
      .count();
    let ends = traces
      .iter()
      .filter(|t| t.node_id == node && t.kind == TraceKind::End)
      .count();
    assert_eq!((starts, ends), (1, 1), "{}", node);
  }
  let run_ends = traces
    .iter()
    .filter(|t| t.node_id == SYSTEM_NODE && t.kind == TraceKind::End)
    .count();
  assert_eq!(run_ends, 1);
  assert_eq!(traces.len(), 6);
  assert_eq!(traces[1].duration_ms, Some(10));
}

#[test]
fn out_of_order_iteration_is_discarded() {
  let mut s = state();
  let mut patches = vec![];
  for it in [1, 3, 2, 5] {
    let effects = reduce(
      &mut s,
      &ev("node_end", json!({"name": "judge", "output": {"iteration": it}})),
    );
    patches.extend(effects.into_iter().filter_map(|e| match e {
      Effect::Patch(SessionPatch {
        iteration: Some(i), ..
      }) => Some(i),
      _ => None,
    }));
  }
  assert_eq!(s.run.iteration, 5);
  assert_eq!(patches, vec![1, 3, 5]);
}

#[test]
fn completed_count_is_recomputed_not_accumulated() {
  let mut s = state();
  apply_all(
    &mut s,
    &[
      ev("node_end", json!({"name": "a"})),
      ev("node_end", json!({"name": "b"})),
      ev("node_end", json!({"name": "c"})),
      ev("error", json!({"name": "d", "message": "boom"})),
      // Re-terminating a node must not double count it.
      ev("node_start", json!({"name": "a"})),
      ev("node_end", json!({"name": "a"})),
    ],
  );
  assert_eq!(s.run.metrics.nodes_completed, 4);
  assert_eq!(s.nodes["d"].status, NodeStatus::Error);
  assert_eq!(s.run.metrics.errors, 1);
}

#[test]
fn node_start_sets_running_task_and_active_node() {
  let mut s = state();
  let effects = reduce(
    &mut s,
    &ev("node_start", json!({"name": "gemini", "task": "Deep Research analysis"})),
  );
  let n = &s.nodes["gemini"];
  assert_eq!(n.status, NodeStatus::Running);
  assert!(n.started_at.is_some());
  assert!(n.ended_at.is_none());
  assert_eq!(n.task.as_deref(), Some("Deep Research analysis"));
  assert_eq!(s.run.active_node.as_deref(), Some("gemini"));
  assert!(matches!(&effects[0], Effect::NodeState(r) if r.status == NodeStatus::Running));
  assert!(matches!(&effects[1], Effect::Trace(t) if t.kind == TraceKind::Start));
}

#[test]
fn node_end_output_replaces_artifacts_and_health() {
  let mut s = state();
  let effects = reduce(
    &mut s,
    &ev(
      "node_end",
      json!({"name": "diagram", "output": {
        "current_draft": "final draft",
        "diagram": "graph TD; a-->b",
        "global_health": "degraded"
      }}),
    ),
  );
  assert_eq!(s.run.draft, "final draft");
  assert_eq!(s.run.diagram, "graph TD; a-->b");
  assert_eq!(s.run.health, Health::Degraded);
  assert!(effects.contains(&Effect::Draft("final draft".to_string())));
  assert!(effects.contains(&Effect::Diagram("graph TD; a-->b".to_string())));
  assert!(effects.contains(&Effect::Patch(SessionPatch::health(Health::Degraded))));
}

#[test]
fn non_numeric_score_is_ignored() {
  let mut s = state();
  reduce(
    &mut s,
    &ev("node_end", json!({"name": "judge", "output": {"scores": [7.0, "n/a"]}})),
  );
  reduce(
    &mut s,
    &ev("node_end", json!({"name": "judge", "output": {"scores": []}})),
  );
  assert!(s.run.scores.is_empty());
}

#[test]
fn boost_flips_once() {
  let mut s = state();
  let out = json!({"name": "judge", "output": {"is_boosted": true}});
  let first = reduce(&mut s, &ev("node_end", out.clone()));
  let second = reduce(&mut s, &ev("node_end", out));
  assert!(first.contains(&Effect::Patch(SessionPatch::boosted(true))));
  assert!(!second.contains(&Effect::Patch(SessionPatch::boosted(true))));
  let boosts = s
    .traces
    .iter()
    .filter(|t| t.message.as_deref() == Some(BOOST_ACTIVATED))
    .count();
  assert_eq!(boosts, 1);
}

#[test]
fn tokens_only_touch_live_output() {
  let mut s = state();
  let effects = apply_all(
    &mut s,
    &[
      ev("token", json!({"content": "Hello, "})),
      ev("token", json!({"content": "world"})),
    ],
  );
  assert!(effects.is_empty());
  assert_eq!(s.live_output, "Hello, world");
  assert!(s.traces.is_empty());
}

#[test]
fn draft_update_is_independent_of_node_end() {
  let mut s = state();
  let effects = reduce(&mut s, &ev("draft_update", json!({"content": "partial"})));
  assert_eq!(s.run.draft, "partial");
  assert_eq!(effects, vec![Effect::Draft("partial".to_string())]);
}

#[test]
fn metrics_merge_present_fields_only() {
  let mut s = state();
  reduce(&mut s, &ev("metrics", json!({"tokens": 120, "thoughts": 3})));
  reduce(&mut s, &ev("metrics", json!({"tokens": 150})));
  assert_eq!(s.run.metrics.tokens, 150);
  assert_eq!(s.run.metrics.thoughts, 3);
  reduce(&mut s, &ev("thought", json!({"content": "consider sources"})));
  assert_eq!(s.run.metrics.thoughts, 4);
}

#[test]
fn error_without_node_is_system_trace_and_critical() {
  let mut s = state();
  let effects = reduce(
    &mut s,
    &ev("error", json!({"message": "rate limited", "type": "RateLimitError"})),
  );
  assert_eq!(s.run.health, Health::Critical);
  assert_eq!(s.run.metrics.errors, 1);
  let t = s.traces.to_vec().pop().unwrap();
  assert_eq!(t.node_id, SYSTEM_NODE);
  assert_eq!(t.kind, TraceKind::Error);
  assert_eq!(t.message.as_deref(), Some("rate limited"));
  assert_eq!(t.payload.unwrap()["type"], "RateLimitError");
  assert!(effects.contains(&Effect::Patch(SessionPatch::health(Health::Critical))));

  reduce(&mut s, &ev("error", json!({"message": "again"})));
  assert_eq!(s.run.metrics.errors, 2);
}

#[test]
fn custom_and_unknown_kinds() {
  let mut s = state();
  let custom = reduce(&mut s, &ev("custom_judge", json!({"note": "x"})));
  assert_eq!(custom.len(), 1);
  let t = s.traces.to_vec().pop().unwrap();
  assert_eq!(t.node_id, SYSTEM_NODE);
  assert_eq!(t.kind, TraceKind::Custom);
  assert_eq!(t.message.as_deref(), Some("custom_judge"));

  let before = s.traces.len();
  let unknown = reduce(&mut s, &ev("on_llm_stream", json!({"x": 1})));
  assert!(unknown.is_empty());
  assert_eq!(s.traces.len(), before);
}

#[test]
fn progress_run_start_and_interaction_are_system_traces() {
  let mut s = state();
  apply_all(
    &mut s,
    &[
      ev("run_start", json!({"task": "survey", "max_iterations": 7})),
      ev("progress", json!({"message": "Retry attempt 2/3"})),
      ev("interaction_start", json!({"interaction_id": "abc"})),
    ],
  );
  let messages: Vec<String> = s.traces.iter().filter_map(|t| t.message.clone()).collect();
  assert_eq!(
    messages,
    vec!["Run started: survey", "Retry attempt 2/3", "Interaction abc"]
  );
  assert!(s.traces.iter().all(|t| t.kind == TraceKind::Custom));
}

#[test]
fn unknown_catalog_nodes_are_tracked() {
  let mut s = state();
  reduce(&mut s, &ev("node_start", json!({"name": "not_in_catalog"})));
  assert_eq!(s.nodes["not_in_catalog"].status, NodeStatus::Running);
}

#[test]
fn reflections_are_forwarded_once_per_iteration() {
  let mut s = state();
  let out = |its: &[u64]| {
    let memories: Vec<Value> = its
      .iter()
      .map(|i| json!({"iteration": i, "score": 7.5, "reflection": "r"}))
      .collect();
    json!({"name": "reflection", "output": {"reflection_memories": memories}})
  };
  let count = |effects: Vec<Effect>| {
    effects
      .iter()
      .filter(|e| matches!(e, Effect::Reflection(_)))
      .count()
  };
  assert_eq!(count(reduce(&mut s, &ev("node_end", out(&[1])))), 1);
  assert_eq!(count(reduce(&mut s, &ev("node_end", out(&[1, 2])))), 1);
  assert_eq!(count(reduce(&mut s, &ev("node_end", out(&[1, 2])))), 0);
}

#[test]
fn finalize_cancelled_forces_critical_and_clears_active() {
  let mut s = state();
  reduce(&mut s, &ev("node_start", json!({"name": "refiner"})));
  reduce(&mut s, &ev("token", json!({"content": "half"})));
  let effects = finalize(&mut s, &Termination::Cancelled, Utc::now());
  assert_eq!(s.live_output, format!("half\n\n{}", CANCELLED_MARKER));
  assert!(!s.run.running);
  assert!(s.run.ended);
  assert!(s.run.active_node.is_none());
  assert_eq!(s.run.health, Health::Critical);
  assert_eq!(
    effects.last(),
    Some(&Effect::Patch(SessionPatch::status("cancelled")))
  );
}

#[test]
fn finalize_completed_keeps_health_and_adds_no_trace() {
  let mut s = state();
  reduce(&mut s, &ev("token", json!({"content": "done"})));
  let before = s.traces.len();
  let effects = finalize(&mut s, &Termination::Completed, Utc::now());
  assert_eq!(s.live_output, "done");
  assert_eq!(s.run.health, Health::Healthy);
  assert_eq!(s.traces.len(), before);
  assert_eq!(
    effects,
    vec![Effect::Patch(SessionPatch::status("completed"))]
  );
}

#[test]
fn finalize_failed_records_reason() {
  let mut s = state();
  finalize(
    &mut s,
    &Termination::Failed("status 500".to_string()),
    Utc::now(),
  );
  let t = s.traces.to_vec().pop().unwrap();
  assert_eq!(t.kind, TraceKind::Error);
  assert_eq!(t.message.as_deref(), Some("status 500"));
  assert_eq!(s.live_output, "[error: status 500]");
  assert_eq!(Termination::Failed(String::new()).status(), "error");
}
