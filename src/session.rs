//! Session lifecycle: connect, stream, cancel and tear down one observed run.
//!
//! Phases move `idle -> starting -> streaming -> draining -> ended`, or into `aborted` from
//! starting or streaming on cancellation or transport failure. Every run starts from a full
//! reset; nothing resumes.
//!
//! Transport failures never escape [SessionController::run]: they become a
//! [Termination::Failed] and show up in the run state as critical health.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;
use crate::event_source::{ByteStream, EventSource, RunRequest};
use crate::frame_decoder::{Frame, decode_stream};
use crate::reducer::{Effect, Termination};
use crate::remote_store::RemoteStore;
use crate::state_store::StateStore;
use crate::sync_queue::SyncQueue;
use crate::types::{
  EventKind, MessageRecord, NODE_CATALOG, NewSession, RunSnapshot, SessionPatch, SessionState,
};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
  #[default]
  Idle,
  Starting,
  Streaming,
  Draining,
  Ended,
  Aborted,
}

impl SessionPhase {
  /// Phases in which an abort request still has an effect.
  pub fn is_abortable(self) -> bool {
    matches!(self, SessionPhase::Starting | SessionPhase::Streaming)
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, SessionPhase::Ended | SessionPhase::Aborted)
  }
}

impl fmt::Display for SessionPhase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      SessionPhase::Idle => "idle",
      SessionPhase::Starting => "starting",
      SessionPhase::Streaming => "streaming",
      SessionPhase::Draining => "draining",
      SessionPhase::Ended => "ended",
      SessionPhase::Aborted => "aborted",
    };
    f.write_str(s)
  }
}

/// Cloneable handle that cancels the running session of its controller.
#[derive(Debug, Clone)]
pub struct AbortHandle {
  aborted: Arc<watch::Sender<bool>>,
  phase: watch::Receiver<SessionPhase>,
}

impl AbortHandle {
  /// Requests cancellation. Returns `true` only for the call that actually cancelled a
  /// starting or streaming session; every other call is a no-op.
  pub fn abort(&self) -> bool {
    if !self.phase.borrow().is_abortable() {
      return false;
    }
    self.aborted.send_if_modified(|aborted| {
      if *aborted {
        false
      } else {
        *aborted = true;
        true
      }
    })
  }

  pub fn is_aborted(&self) -> bool {
    *self.aborted.borrow()
  }
}

/// Receiving side of the abort flag, owned by the running session.
#[derive(Debug)]
struct AbortSignal {
  rx: watch::Receiver<bool>,
}

impl AbortSignal {
  /// Completes once abort was requested. Never completes if the flag can no longer change.
  async fn cancelled(&mut self) {
    loop {
      if *self.rx.borrow_and_update() {
        return;
      }
      if self.rx.changed().await.is_err() {
        std::future::pending::<()>().await;
      }
    }
  }
}

/// Result of one [SessionController::run].
#[derive(Debug, Clone)]
pub struct SessionOutcome {
  pub termination: Termination,
  /// Either [SessionPhase::Ended] or [SessionPhase::Aborted].
  pub phase: SessionPhase,
  /// Remote session id, when the mirror could be created.
  pub session_id: Option<String>,
  pub snapshot: RunSnapshot,
}

/// Ties decoder, reducer, state store and sync queue together for one run at a time.
pub struct SessionController {
  config: ClientConfig,
  source: Arc<dyn EventSource>,
  remote: Option<Arc<dyn RemoteStore>>,
  state: StateStore,
  aborted: Arc<watch::Sender<bool>>,
  phase: watch::Sender<SessionPhase>,
}

impl SessionController {
  pub fn new(
    config: ClientConfig,
    source: Arc<dyn EventSource>,
    remote: Option<Arc<dyn RemoteStore>>,
  ) -> Self {
    let state = StateStore::new(config.sync.trace_cap);
    let (aborted, _) = watch::channel(false);
    let (phase, _) = watch::channel(SessionPhase::Idle);
    Self {
      config,
      source,
      remote,
      state,
      aborted: Arc::new(aborted),
      phase,
    }
  }

  pub fn abort_handle(&self) -> AbortHandle {
    AbortHandle {
      aborted: self.aborted.clone(),
      phase: self.phase.subscribe(),
    }
  }

  /// Snapshots published after every applied event.
  pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
    self.state.subscribe()
  }

  pub fn phases(&self) -> watch::Receiver<SessionPhase> {
    self.phase.subscribe()
  }

  pub fn phase(&self) -> SessionPhase {
    *self.phase.borrow()
  }

  pub fn state(&self) -> &SessionState {
    self.state.state()
  }

  pub fn snapshot(&self) -> RunSnapshot {
    self.state.snapshot()
  }

  /// Empties the in-memory trace list of the current session.
  pub fn clear_trace(&mut self) {
    self.state.clear_trace();
  }

  /// Discards the current session's in-memory state and returns to idle.
  pub fn reset(&mut self) {
    self.state.reset(NODE_CATALOG.len() as u64);
    self.set_phase(SessionPhase::Idle);
  }

  /// Observes one run of `task` until it ends, is aborted, or its transport fails.
  #[instrument(level = "trace", skip(self, task), fields(backend = %self.config.backend))]
  pub async fn run(&mut self, task: &str) -> SessionOutcome {
    self.reset();
    self.aborted.send_replace(false);
    let mut signal = AbortSignal {
      rx: self.aborted.subscribe(),
    };
    self.set_phase(SessionPhase::Starting);
    self.state.begin();

    let sync = self.open_mirror(task).await;
    sync.submit(Effect::Patch(SessionPatch::status("running")));
    sync.append_message(MessageRecord {
      role: "user".to_string(),
      content: task.to_string(),
      metadata: json!({ "backend": self.config.backend.to_string() }),
    });

    let request = RunRequest {
      task: task.to_string(),
      max_iterations: self.config.max_iterations,
    };
    let source = self.source.clone();
    let connected = tokio::select! {
      biased;
      _ = signal.cancelled() => Err(Termination::Cancelled),
      result = source.connect(&request) => result.map_err(|e| {
        warn!(error = %e, "could not open event stream");
        Termination::Failed(e.to_string())
      }),
    };

    let termination = match connected {
      Ok(chunks) => {
        self.set_phase(SessionPhase::Streaming);
        consume(chunks, &mut self.state, &sync, &mut signal).await
      }
      Err(termination) => termination,
    };

    let phase = match termination {
      Termination::Completed => SessionPhase::Draining,
      Termination::Cancelled | Termination::Failed(_) => SessionPhase::Aborted,
    };
    self.set_phase(phase);

    sync.submit_all(self.state.finalize(&termination, Utc::now()));
    sync.append_message(self.assistant_message(&termination));
    let session_id = sync.session_id().map(str::to_string);
    sync.close().await;

    let phase = if phase == SessionPhase::Draining {
      SessionPhase::Ended
    } else {
      phase
    };
    self.set_phase(phase);
    info!(
      status = termination.status(),
      session_id = ?session_id,
      "session finished"
    );

    SessionOutcome {
      termination,
      phase,
      session_id,
      snapshot: self.state.snapshot(),
    }
  }

  /// Creates the remote session record. A failure leaves the run unmirrored.
  async fn open_mirror(&self, task: &str) -> SyncQueue {
    let Some(remote) = &self.remote else {
      return SyncQueue::detached();
    };
    let new = NewSession::for_task(
      task,
      self.config.backend.to_string(),
      self.config.max_iterations,
    );
    match remote.create_session(new).await {
      Ok(id) => SyncQueue::start(remote.clone(), id, &self.config.sync),
      Err(e) => {
        warn!(error = %e, "remote session not created; run will not be mirrored");
        SyncQueue::detached()
      }
    }
  }

  /// Final assistant output: the latest draft when there is one, otherwise the finalized
  /// live output, which already carries the termination marker.
  fn assistant_message(&self, termination: &Termination) -> MessageRecord {
    let state = self.state.state();
    let content = if state.run.draft.is_empty() {
      state.live_output.clone()
    } else {
      let mut draft = state.run.draft.clone();
      termination.mark(&mut draft);
      draft
    };
    MessageRecord {
      role: "assistant".to_string(),
      content,
      metadata: json!({
        "status": termination.status(),
        "iteration": state.run.iteration,
        "scores": state.run.scores,
        "health": state.run.health,
      }),
    }
  }

  fn set_phase(&self, phase: SessionPhase) {
    let previous = self.phase.send_replace(phase);
    if previous != phase {
      debug!(from = %previous, to = %phase, "session phase");
    }
  }
}

impl fmt::Debug for SessionController {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SessionController")
      .field("config", &self.config)
      .field("phase", &self.phase())
      .field("mirrored", &self.remote.is_some())
      .finish()
  }
}

/// Applies decoded events until the stream ends, a run-end arrives, or abort is requested.
async fn consume(
  chunks: ByteStream,
  state: &mut StateStore,
  sync: &SyncQueue,
  signal: &mut AbortSignal,
) -> Termination {
  let mut frames = Box::pin(decode_stream(chunks));
  loop {
    tokio::select! {
      biased;
      _ = signal.cancelled() => return Termination::Cancelled,
      next = frames.next() => match next {
        None => return Termination::Completed,
        Some(Ok(Frame::Event(event))) => {
          let run_end = event.kind == EventKind::RunEnd;
          sync.submit_all(state.apply(&event));
          if run_end {
            return Termination::Completed;
          }
        }
        Some(Ok(Frame::Malformed(e))) => debug!(error = %e, "dropping malformed event line"),
        Some(Err(e)) => {
          warn!(error = %e, "event stream failed");
          return Termination::Failed(e.to_string());
        }
      },
    }
  }
}
