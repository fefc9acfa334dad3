//! The remote persistence boundary and an in-process implementation of it.
//!
//! The synchronization queue only ever talks to a [RemoteStore]. [MemoryStore] keeps all
//! records in a mutex-guarded map and is what tests and the CLI use when no real backend is
//! wired in.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{ChildRecord, NewSession, NodeStateRecord, SessionPatch, SessionRecord};

/// Remote document store holding sessions, their child records and node states.
#[async_trait]
pub trait RemoteStore: Send + Sync {
  /// Creates a session record and returns its id.
  async fn create_session(&self, new: NewSession) -> Result<String, StoreError>;

  async fn patch_session(&self, session_id: &str, patch: SessionPatch)
  -> Result<(), StoreError>;

  /// Appends a message, trace, score or reflection record.
  async fn append_child(&self, session_id: &str, record: ChildRecord) -> Result<(), StoreError>;

  /// Inserts or replaces the node state keyed by `record.node_id`.
  async fn upsert_node_state(
    &self,
    session_id: &str,
    record: NodeStateRecord,
  ) -> Result<(), StoreError>;

  /// Sessions, newest first. Sessions created at the same instant list the later one first.
  async fn list_sessions(&self) -> Result<Vec<SessionRecord>, StoreError>;

  async fn list_children(&self, session_id: &str) -> Result<Vec<ChildRecord>, StoreError>;

  async fn list_node_states(&self, session_id: &str)
  -> Result<Vec<NodeStateRecord>, StoreError>;

  /// Deletes a session together with its children and node states.
  async fn delete_session(&self, session_id: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct Inner {
  /// Each session with its creation sequence number.
  sessions: HashMap<String, (u64, SessionRecord)>,
  next_seq: u64,
  children: HashMap<String, Vec<ChildRecord>>,
  node_states: HashMap<String, Vec<NodeStateRecord>>,
  patches: Vec<(String, SessionPatch)>,
}

/// [RemoteStore] backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
  inner: Mutex<Inner>,
  fail_writes: AtomicBool,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// When set, every write fails with [StoreError::Unavailable]. Reads keep working.
  pub fn set_fail_writes(&self, fail: bool) {
    self.fail_writes.store(fail, Ordering::SeqCst);
  }

  /// Every accepted patch, in the order it was applied.
  pub fn patches(&self) -> Vec<(String, SessionPatch)> {
    self.lock().map(|g| g.patches.clone()).unwrap_or_default()
  }

  pub fn session(&self, session_id: &str) -> Option<SessionRecord> {
    self
      .lock()
      .ok()
      .and_then(|g| g.sessions.get(session_id).map(|(_, r)| r.clone()))
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
    self
      .inner
      .lock()
      .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
  }

  fn check_writable(&self) -> Result<(), StoreError> {
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(StoreError::Unavailable("writes disabled".to_string()));
    }
    Ok(())
  }

  fn known(inner: &Inner, session_id: &str) -> Result<(), StoreError> {
    if inner.sessions.contains_key(session_id) {
      Ok(())
    } else {
      Err(StoreError::UnknownSession(session_id.to_string()))
    }
  }
}

#[async_trait]
impl RemoteStore for MemoryStore {
  #[instrument(level = "trace", skip(self))]
  async fn create_session(&self, new: NewSession) -> Result<String, StoreError> {
    self.check_writable()?;
    if new.name.trim().is_empty() {
      return Err(StoreError::Rejected("session name is empty".to_string()));
    }
    let id = Uuid::new_v4().to_string();
    let record = SessionRecord::new(id.clone(), new, Utc::now());
    let mut inner = self.lock()?;
    let seq = inner.next_seq;
    inner.next_seq += 1;
    inner.sessions.insert(id.clone(), (seq, record));
    debug!(session_id = %id, "session created");
    Ok(id)
  }

  #[instrument(level = "trace", skip(self))]
  async fn patch_session(
    &self,
    session_id: &str,
    patch: SessionPatch,
  ) -> Result<(), StoreError> {
    self.check_writable()?;
    let mut inner = self.lock()?;
    let (_, record) = inner
      .sessions
      .get_mut(session_id)
      .ok_or_else(|| StoreError::UnknownSession(session_id.to_string()))?;
    record.apply(&patch);
    inner.patches.push((session_id.to_string(), patch));
    Ok(())
  }

  #[instrument(level = "trace", skip(self, record))]
  async fn append_child(&self, session_id: &str, record: ChildRecord) -> Result<(), StoreError> {
    self.check_writable()?;
    let mut inner = self.lock()?;
    Self::known(&inner, session_id)?;
    inner
      .children
      .entry(session_id.to_string())
      .or_default()
      .push(record);
    Ok(())
  }

  #[instrument(level = "trace", skip(self, record), fields(node_id = %record.node_id))]
  async fn upsert_node_state(
    &self,
    session_id: &str,
    record: NodeStateRecord,
  ) -> Result<(), StoreError> {
    self.check_writable()?;
    let mut inner = self.lock()?;
    Self::known(&inner, session_id)?;
    let states = inner.node_states.entry(session_id.to_string()).or_default();
    match states.iter_mut().find(|s| s.node_id == record.node_id) {
      Some(existing) => *existing = record,
      None => states.push(record),
    }
    Ok(())
  }

  async fn list_sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
    let inner = self.lock()?;
    let mut sessions: Vec<&(u64, SessionRecord)> = inner.sessions.values().collect();
    // Creation order breaks ties between equal timestamps.
    sessions.sort_by(|(a_seq, a), (b_seq, b)| {
      b.created_at
        .cmp(&a.created_at)
        .then_with(|| b_seq.cmp(a_seq))
    });
    Ok(sessions.into_iter().map(|(_, r)| r.clone()).collect())
  }

  async fn list_children(&self, session_id: &str) -> Result<Vec<ChildRecord>, StoreError> {
    let inner = self.lock()?;
    Self::known(&inner, session_id)?;
    Ok(inner.children.get(session_id).cloned().unwrap_or_default())
  }

  async fn list_node_states(
    &self,
    session_id: &str,
  ) -> Result<Vec<NodeStateRecord>, StoreError> {
    let inner = self.lock()?;
    Self::known(&inner, session_id)?;
    Ok(inner.node_states.get(session_id).cloned().unwrap_or_default())
  }

  #[instrument(level = "trace", skip(self))]
  async fn delete_session(&self, session_id: &str) -> Result<(), StoreError> {
    self.check_writable()?;
    let mut inner = self.lock()?;
    Self::known(&inner, session_id)?;
    // Dependents first, then the session itself.
    inner.children.remove(session_id);
    inner.node_states.remove(session_id);
    inner.sessions.remove(session_id);
    debug!(session_id, "session deleted");
    Ok(())
  }
}
