//! CLI: Start a run on the backend and follow its event stream until it ends.
//!
//! Usage: `watch_run [OPTIONS] <task>`
//! Example: watch_run --backend gemini "Compare retrieval strategies for long documents"
//!
//! Ctrl-C cancels the run. With --snapshot-dir the final state is written to
//! `<dir>/run_snapshot.json`.
//!
//! Set RUST_LOG=runmirror=trace for TRACE-level span enter/exit and events.

use clap::Parser;
use runmirror::config::{DEFAULT_BASE_URL, DEFAULT_MAX_ITERATIONS};
use runmirror::snapshot_io::{save_snapshot, snapshot_path};
use runmirror::{
  BackendMode, ClientConfig, HttpEventSource, MemoryStore, RemoteStore, SessionController,
  SessionPhase,
};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

/// Start a run on the backend and follow its event stream.
#[derive(Parser, Debug)]
#[command(name = "watch_run")]
#[command(
  after_help = r#"Environment variables (override the matching flags when set):
  RUNMIRROR_BASE_URL         Backend base URL (default: http://localhost:8000).
  RUNMIRROR_BACKEND          langgraph | gemini.
  RUNMIRROR_MAX_ITERATIONS   Refinement iteration cap sent with the run request.

Examples:
  watch_run "Survey vector databases"
  watch_run --backend gemini --snapshot-dir /tmp/run "Survey vector databases""#
)]
struct Args {
  /// Backend base URL. Overridden by RUNMIRROR_BASE_URL if set.
  #[arg(long, value_name = "URL", default_value = DEFAULT_BASE_URL)]
  base_url: String,

  /// Backend mode selecting the streaming endpoint. Overridden by RUNMIRROR_BACKEND if set.
  #[arg(long, value_name = "MODE", default_value = "langgraph")]
  backend: BackendMode,

  /// Maximum refinement iterations. Overridden by RUNMIRROR_MAX_ITERATIONS if set.
  #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_ITERATIONS)]
  max_iterations: u32,

  /// Directory to write the final run snapshot into.
  #[arg(long, value_name = "DIR")]
  snapshot_dir: Option<PathBuf>,

  /// Task description sent to the backend
  #[arg(value_name = "task")]
  task: String,
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_span_events(FmtSpan::ENTER | FmtSpan::EXIT)
    .init();

  let args = Args::parse();

  let flags = ClientConfig {
    base_url: args.base_url.clone(),
    backend: args.backend,
    max_iterations: args.max_iterations,
    ..ClientConfig::default()
  };
  // Env vars override flags.
  let config = match flags.with_overrides(|key| std::env::var(key).ok()) {
    Ok(c) => c,
    Err(e) => {
      eprintln!("Invalid configuration: {}", e);
      process::exit(2);
    }
  };
  info!(url = %config.stream_url(), max_iterations = config.max_iterations, "options (env or flags)");

  let source = Arc::new(HttpEventSource::new(&config));
  let mirror = Arc::new(MemoryStore::new());
  let mut controller = SessionController::new(config, source, Some(mirror.clone()));

  let handle = controller.abort_handle();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() && handle.abort() {
      warn!("cancel requested");
    }
  });

  let mut snapshots = controller.subscribe();
  tokio::spawn(async move {
    let mut active: Option<String> = None;
    while snapshots.changed().await.is_ok() {
      let current = snapshots.borrow_and_update().run.active_node.clone();
      if current.is_some() && current != active {
        info!(node = ?current, "stage running");
      }
      active = current;
    }
  });

  let outcome = controller.run(&args.task).await;
  let snap = &outcome.snapshot;

  if let Some(dir) = &args.snapshot_dir {
    let path = snapshot_path(dir);
    match save_snapshot(&path, snap) {
      Ok(()) => info!(path = %path.display(), "snapshot written"),
      Err(e) => eprintln!("Error writing snapshot: {}", e),
    }
  }

  let mirrored = match &outcome.session_id {
    Some(id) => mirror.list_children(id).await.map(|c| c.len()).unwrap_or(0),
    None => 0,
  };

  println!("Run {}.", outcome.termination.status());
  println!("  Phase: {}", outcome.phase);
  println!("  Iteration: {}", snap.run.iteration);
  println!("  Scores: {:?}", snap.run.scores);
  println!("  Health: {}", snap.run.health);
  println!(
    "  Nodes completed: {}/{}",
    snap.run.metrics.nodes_completed, snap.run.metrics.nodes_total
  );
  println!("  Errors: {}", snap.run.metrics.errors);
  println!("  Mirrored records: {}", mirrored);
  if !snap.run.draft.is_empty() {
    println!();
    println!("{}", snap.run.draft);
  }
  if outcome.phase != SessionPhase::Ended {
    process::exit(1);
  }
}
