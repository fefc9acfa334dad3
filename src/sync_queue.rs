//! Outbound write path from reducer effects to the [RemoteStore].
//!
//! Each write class has its own worker task:
//!
//! - draft and diagram text are debounced: only the latest value after a quiet window is
//!   written, and a newer value restarts the window;
//! - trace, score, reflection and message records are appended through a FIFO batch queue
//!   that writes up to `batch_size` records per cycle and pauses `batch_delay` between cycles
//!   while records remain;
//! - session patches and node-state upserts are written immediately, in order.
//!
//! Failed writes are logged and dropped. Without a session id nothing is written at all.
//! Workers live exactly as long as the queue: [SyncQueue::close] flushes and joins them,
//! dropping the queue aborts them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace, warn};

use crate::config::SyncConfig;
use crate::reducer::Effect;
use crate::remote_store::RemoteStore;
use crate::types::{ChildRecord, MessageRecord, NodeStateRecord, SessionPatch, TraceRecord};

/// Write that bypasses batching and debouncing.
#[derive(Debug)]
enum Immediate {
  Patch(SessionPatch),
  NodeState(NodeStateRecord),
}

/// Which debounced session field a worker owns.
#[derive(Debug, Clone, Copy)]
enum Debounced {
  Draft,
  Diagram,
}

impl Debounced {
  fn patch(self, value: String) -> SessionPatch {
    match self {
      Debounced::Draft => SessionPatch::draft(value),
      Debounced::Diagram => SessionPatch::diagram(value),
    }
  }
}

/// Routes effects of one session to the remote store.
pub struct SyncQueue {
  session_id: Option<String>,
  immediate: Option<mpsc::UnboundedSender<Immediate>>,
  batch: Option<mpsc::UnboundedSender<ChildRecord>>,
  draft: Option<watch::Sender<Option<String>>>,
  diagram: Option<watch::Sender<Option<String>>>,
  workers: Vec<JoinHandle<()>>,
}

impl SyncQueue {
  /// Starts the workers for `session_id`. Must be called inside a tokio runtime.
  pub fn start(store: Arc<dyn RemoteStore>, session_id: String, config: &SyncConfig) -> Self {
    let (immediate_tx, immediate_rx) = mpsc::unbounded_channel();
    let (batch_tx, batch_rx) = mpsc::unbounded_channel();
    let (draft_tx, draft_rx) = watch::channel(None);
    let (diagram_tx, diagram_rx) = watch::channel(None);

    let workers = vec![
      tokio::spawn(immediate_worker(
        store.clone(),
        session_id.clone(),
        immediate_rx,
      )),
      tokio::spawn(batch_worker(
        store.clone(),
        session_id.clone(),
        batch_rx,
        config.batch_size.max(1),
        config.batch_delay(),
      )),
      tokio::spawn(debounce_worker(
        store.clone(),
        session_id.clone(),
        draft_rx,
        config.draft_debounce(),
        Debounced::Draft,
      )),
      tokio::spawn(debounce_worker(
        store,
        session_id.clone(),
        diagram_rx,
        config.diagram_debounce(),
        Debounced::Diagram,
      )),
    ];
    debug!(session_id = %session_id, "sync queue started");

    Self {
      session_id: Some(session_id),
      immediate: Some(immediate_tx),
      batch: Some(batch_tx),
      draft: Some(draft_tx),
      diagram: Some(diagram_tx),
      workers,
    }
  }

  /// Queue with no session: every submission is dropped.
  pub fn detached() -> Self {
    Self {
      session_id: None,
      immediate: None,
      batch: None,
      draft: None,
      diagram: None,
      workers: Vec::new(),
    }
  }

  pub fn session_id(&self) -> Option<&str> {
    self.session_id.as_deref()
  }

  /// Routes one reducer effect to its write class.
  pub fn submit(&self, effect: Effect) {
    match effect {
      Effect::Patch(patch) => self.send_immediate(Immediate::Patch(patch)),
      Effect::NodeState(record) => self.send_immediate(Immediate::NodeState(record)),
      Effect::Draft(text) => replace_latest(self.draft.as_ref(), text),
      Effect::Diagram(text) => replace_latest(self.diagram.as_ref(), text),
      Effect::Trace(entry) => self.send_batch(ChildRecord::Trace(TraceRecord::from(&entry))),
      Effect::Score(score) => self.send_batch(ChildRecord::Score(score)),
      Effect::Reflection(reflection) => self.send_batch(ChildRecord::Reflection(reflection)),
    }
  }

  pub fn submit_all(&self, effects: impl IntoIterator<Item = Effect>) {
    for effect in effects {
      self.submit(effect);
    }
  }

  /// Queues a chat message behind any records already waiting.
  pub fn append_message(&self, message: MessageRecord) {
    self.send_batch(ChildRecord::Message(message));
  }

  /// Flushes everything queued and waits for the workers to finish.
  ///
  /// Pending debounced values are written without waiting out their window.
  #[instrument(level = "trace", skip(self), fields(session_id = ?self.session_id))]
  pub async fn close(mut self) {
    self.immediate.take();
    self.batch.take();
    self.draft.take();
    self.diagram.take();
    for handle in std::mem::take(&mut self.workers) {
      if let Err(e) = handle.await {
        warn!(error = %e, "sync worker ended abnormally");
      }
    }
  }

  fn send_immediate(&self, op: Immediate) {
    if let Some(tx) = &self.immediate
      && tx.send(op).is_err()
    {
      trace!("immediate worker gone; write dropped");
    }
  }

  fn send_batch(&self, record: ChildRecord) {
    if let Some(tx) = &self.batch
      && tx.send(record).is_err()
    {
      trace!("batch worker gone; record dropped");
    }
  }
}

impl Drop for SyncQueue {
  fn drop(&mut self) {
    for handle in &self.workers {
      handle.abort();
    }
  }
}

impl std::fmt::Debug for SyncQueue {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SyncQueue")
      .field("session_id", &self.session_id)
      .field("workers", &self.workers.len())
      .finish()
  }
}

fn replace_latest(tx: Option<&watch::Sender<Option<String>>>, value: String) {
  if let Some(tx) = tx {
    tx.send_replace(Some(value));
  }
}

async fn immediate_worker(
  store: Arc<dyn RemoteStore>,
  session_id: String,
  mut rx: mpsc::UnboundedReceiver<Immediate>,
) {
  while let Some(op) = rx.recv().await {
    let result = match op {
      Immediate::Patch(patch) => store.patch_session(&session_id, patch).await,
      Immediate::NodeState(record) => store.upsert_node_state(&session_id, record).await,
    };
    if let Err(e) = result {
      warn!(session_id = %session_id, error = %e, "immediate write failed");
    }
  }
}

async fn batch_worker(
  store: Arc<dyn RemoteStore>,
  session_id: String,
  mut rx: mpsc::UnboundedReceiver<ChildRecord>,
  batch_size: usize,
  batch_delay: Duration,
) {
  let mut batch = Vec::with_capacity(batch_size);
  loop {
    if rx.recv_many(&mut batch, batch_size).await == 0 {
      break;
    }
    trace!(records = batch.len(), "flushing batch");
    for record in batch.drain(..) {
      if let Err(e) = store.append_child(&session_id, record).await {
        warn!(session_id = %session_id, error = %e, "batched write failed");
      }
    }
    if !rx.is_empty() {
      tokio::time::sleep(batch_delay).await;
    }
  }
}

async fn debounce_worker(
  store: Arc<dyn RemoteStore>,
  session_id: String,
  mut rx: watch::Receiver<Option<String>>,
  window: Duration,
  field: Debounced,
) {
  let mut closed = false;
  while !closed {
    if rx.changed().await.is_err() {
      break;
    }
    // Restart the window on every newer value; flush at once when the sender is gone.
    loop {
      match tokio::time::timeout(window, rx.changed()).await {
        Ok(Ok(())) => continue,
        Ok(Err(_)) => {
          closed = true;
          break;
        }
        Err(_) => break,
      }
    }
    let latest = rx.borrow_and_update().clone();
    if let Some(value) = latest
      && let Err(e) = store.patch_session(&session_id, field.patch(value)).await
    {
      warn!(session_id = %session_id, field = ?field, error = %e, "debounced write failed");
    }
  }
}
