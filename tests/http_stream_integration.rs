//! Integration tests that serve a scripted event stream from a local axum server and follow it
//! with [HttpEventSource] + [SessionController], mirroring into a [MemoryStore].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use runmirror::types::{ChildRecord, Health, NodeStatus};
use runmirror::{
  BackendMode, ClientConfig, HttpEventSource, MemoryStore, RemoteStore, SessionController,
  SessionPhase, SyncConfig, Termination,
};
use serde_json::{Value, json};

fn sse_line(event: &str, data: Value) -> String {
  let envelope = json!({"event": event, "data": data, "timestamp": "2026-02-14T10:00:00"});
  format!("data: {}\n\n", envelope)
}

/// Full scripted run; the body is cut into small chunks so lines straddle chunk boundaries.
async fn scripted_run(Json(request): Json<Value>) -> Response {
  let task = request["task"].as_str().unwrap_or_default().to_string();
  let body: String = [
    sse_line("run_start", json!({"task": task, "max_iterations": request["max_iterations"]})),
    sse_line("node_start", json!({"name": "data_processing", "task": "Preparing inputs"})),
    sse_line(
      "node_end",
      json!({"name": "data_processing", "output": {"scores": [7.2]}}),
    ),
    ": keep-alive\n\n".to_string(),
    sse_line("node_start", json!({"name": "judge"})),
    sse_line("token", json!({"content": "Draft "})),
    sse_line("token", json!({"content": "text"})),
    sse_line(
      "node_end",
      json!({"name": "judge", "output": {
        "scores": [8.6],
        "iteration": 2,
        "is_boosted": true,
        "current_draft": "Final draft",
        "global_health": "healthy"
      }}),
    ),
    sse_line("run_end", json!({"status": "completed"})),
  ]
  .concat();

  let chunks: Vec<Result<Bytes, std::io::Error>> = body
    .into_bytes()
    .chunks(17)
    .map(|c| Ok(Bytes::copy_from_slice(c)))
    .collect();
  (
    [(header::CONTENT_TYPE, "text/event-stream")],
    Body::from_stream(futures::stream::iter(chunks)),
  )
    .into_response()
}

async fn refuse(Json(_request): Json<Value>) -> Response {
  (StatusCode::INTERNAL_SERVER_ERROR, "model overloaded").into_response()
}

async fn serve(app: Router) -> SocketAddr {
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move {
    axum::serve(listener, app).await.unwrap();
  });
  addr
}

/// Loopback requests must not go through any proxy configured in the environment.
fn http_source(config: &ClientConfig) -> HttpEventSource {
  let client = reqwest::Client::builder().no_proxy().build().unwrap();
  HttpEventSource::with_client(client, config.stream_url())
}

fn config(addr: SocketAddr, backend: BackendMode) -> ClientConfig {
  ClientConfig {
    base_url: format!("http://{}", addr),
    backend,
    max_iterations: 3,
    sync: SyncConfig {
      batch_delay_ms: 0,
      ..SyncConfig::default()
    },
  }
}

#[tokio::test]
async fn http_stream_end_to_end() {
  let addr = serve(Router::new().route("/api/runs/stream", post(scripted_run))).await;
  let config = config(addr, BackendMode::Langgraph);
  let source = Arc::new(http_source(&config));
  let store = Arc::new(MemoryStore::new());
  let mut controller = SessionController::new(config, source, Some(store.clone()));

  let outcome = controller.run("Compare retrieval strategies").await;
  assert_eq!(outcome.termination, Termination::Completed);
  assert_eq!(outcome.phase, SessionPhase::Ended);

  let snap = &outcome.snapshot;
  assert_eq!(snap.run.scores, vec![7.2, 8.6]);
  assert_eq!(snap.run.iteration, 2);
  assert!(snap.run.boosted);
  assert!(!snap.run.running);
  assert_eq!(snap.run.health, Health::Healthy);
  assert_eq!(snap.run.draft, "Final draft");
  assert_eq!(snap.live_output, "Draft text");
  assert_eq!(snap.run.metrics.nodes_completed, 2);
  assert_eq!(
    snap.node("data_processing").unwrap().task.as_deref(),
    Some("Preparing inputs")
  );
  assert_eq!(snap.node("judge").unwrap().status, NodeStatus::Success);
  assert_eq!(
    snap.traces[0].message.as_deref(),
    Some("Run started: Compare retrieval strategies")
  );
  assert_eq!(snap.traces[0].payload.as_ref().unwrap()["max_iterations"], 3);

  let id = outcome.session_id.unwrap();
  let record = store.session(&id).unwrap();
  assert_eq!(record.status, "completed");
  assert_eq!(record.iteration, 2);
  assert!(record.boosted);
  assert_eq!(record.draft, "Final draft");
  assert_eq!(record.backend, "langgraph");

  let children = store.list_children(&id).await.unwrap();
  let scores: Vec<f64> = children
    .iter()
    .filter_map(|c| match c {
      ChildRecord::Score(s) => Some(s.value),
      _ => None,
    })
    .collect();
  assert_eq!(scores, vec![7.2, 8.6]);
  let traces = children
    .iter()
    .filter(|c| matches!(c, ChildRecord::Trace(_)))
    .count();
  assert_eq!(traces, snap.traces.len());
  assert!(matches!(children.first(), Some(ChildRecord::Message(m)) if m.role == "user"));
  assert!(matches!(children.last(), Some(ChildRecord::Message(m)) if m.role == "assistant"));
}

#[tokio::test]
async fn gemini_backend_uses_its_own_endpoint() {
  let addr = serve(Router::new().route("/api/research/gemini/stream", post(scripted_run))).await;
  let config = config(addr, BackendMode::Gemini);
  let source = Arc::new(http_source(&config));
  let mut controller = SessionController::new(config, source, None);

  let outcome = controller.run("t").await;
  assert_eq!(outcome.termination, Termination::Completed);
  assert_eq!(outcome.snapshot.run.iteration, 2);
}

#[tokio::test]
async fn non_success_status_aborts_the_session() {
  let addr = serve(Router::new().route("/api/runs/stream", post(refuse))).await;
  let config = config(addr, BackendMode::Langgraph);
  let source = Arc::new(http_source(&config));
  let store = Arc::new(MemoryStore::new());
  let mut controller = SessionController::new(config, source, Some(store.clone()));

  let outcome = controller.run("t").await;
  match &outcome.termination {
    Termination::Failed(reason) => {
      assert!(reason.contains("500"), "{}", reason);
      assert!(reason.contains("model overloaded"), "{}", reason);
    }
    other => panic!("unexpected termination {:?}", other),
  }
  assert_eq!(outcome.phase, SessionPhase::Aborted);
  assert_eq!(outcome.snapshot.run.health, Health::Critical);

  let id = outcome.session_id.unwrap();
  assert_eq!(store.session(&id).unwrap().status, "error");
}

#[tokio::test]
async fn unreachable_backend_aborts_the_session() {
  // Bind then drop to get a port nothing listens on.
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  drop(listener);

  let config = config(addr, BackendMode::Langgraph);
  let source = Arc::new(http_source(&config));
  let mut controller = SessionController::new(config, source, None);
  let outcome = controller.run("t").await;
  assert!(matches!(outcome.termination, Termination::Failed(_)));
  assert_eq!(outcome.phase, SessionPhase::Aborted);
}
