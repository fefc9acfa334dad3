//! # runmirror
//!
//! Observes a streamed multi-stage agent run, projects it into queryable in-memory state and
//! mirrors that state to a remote store.
//!
//! ## Architecture
//!
//! Bytes flow one way through the crate:
//!
//! 1. an [EventSource] yields the raw chunked stream (`data: {...}` lines);
//! 2. the [frame_decoder] frames and parses it into [EventRecord]s;
//! 3. the [reducer] applies each record to the [StateStore], which publishes a [RunSnapshot]
//!    after every event and returns the remote writes the change implies;
//! 4. the [SyncQueue] debounces, batches or immediately forwards those writes to a
//!    [RemoteStore].
//!
//! [SessionController] drives all of it for one run at a time and owns cancellation.

pub mod config;
pub mod error;
pub mod event_source;
pub mod frame_decoder;
pub mod reducer;
#[cfg(test)]
mod reducer_test;
pub mod remote_store;
pub mod session;
pub mod snapshot_io;
pub mod state_store;
pub mod sync_queue;
pub mod types;

pub use config::{BackendMode, ClientConfig, SyncConfig};
pub use error::{ConfigError, DecodeError, SnapshotError, StoreError, TransportError};
pub use event_source::{ByteStream, ChannelSource, EventSource, HttpEventSource, RunRequest};
pub use frame_decoder::{Frame, FrameDecoder, decode_stream};
pub use reducer::{Effect, Termination, finalize, reduce};
pub use remote_store::{MemoryStore, RemoteStore};
pub use session::{AbortHandle, SessionController, SessionOutcome, SessionPhase};
pub use state_store::StateStore;
pub use sync_queue::SyncQueue;
pub use types::{EventKind, EventRecord, ExecutionNode, RunSnapshot, RunState, TraceEntry};
