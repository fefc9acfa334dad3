//! Session data model: nodes, traces, run aggregate, inbound events and remote records.

mod event_record;
mod execution_node;
pub mod node_catalog;
mod node_status;
mod remote_records;
mod run_snapshot;
mod run_state;
mod session_state;
mod trace_entry;
mod trace_log;

pub use event_record::{CUSTOM_PREFIX, EventKind, EventRecord};
pub use execution_node::ExecutionNode;
pub use node_catalog::{CATALOG_EDGES, CatalogNode, NODE_CATALOG};
pub use node_status::NodeStatus;
pub use remote_records::{
  ChildRecord, MessageRecord, NewSession, NodeStateRecord, ReflectionRecord, ScoreRecord,
  SessionPatch, SessionRecord, TraceRecord,
};
pub use run_snapshot::RunSnapshot;
pub use run_state::{Health, Metrics, RunState};
pub use session_state::SessionState;
pub use trace_entry::{SYSTEM_NODE, TraceEntry, TraceKind};
pub use trace_log::{DEFAULT_TRACE_CAP, TraceLog};
