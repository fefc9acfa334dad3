//! Error types, one enum per failure domain.
//!
//! None of these ever cross the stream-consumption boundary: the session controller converts
//! transport failures into state (health, status) and only logs decode and store failures.

use std::path::PathBuf;

use thiserror::Error;

/// A single event line that could not be turned into an [crate::types::EventRecord].
#[derive(Debug, Error)]
pub enum DecodeError {
  #[error("line is not valid UTF-8: {0}")]
  Utf8(#[from] std::str::Utf8Error),
  #[error("malformed event payload in {line:?}: {source}")]
  Json {
    line: String,
    #[source]
    source: serde_json::Error,
  },
  #[error("event payload in {line:?} is not an object")]
  NotAnObject { line: String },
}

/// Failure to establish or keep the inbound event stream.
#[derive(Debug, Error)]
pub enum TransportError {
  #[error("connect failed: {0}")]
  Connect(#[source] reqwest::Error),
  #[error("backend responded with status {status}: {body}")]
  Status { status: u16, body: String },
  #[error("stream read failed: {0}")]
  Read(#[source] reqwest::Error),
  #[error("event source closed before connecting")]
  SourceClosed,
  #[error("{0}")]
  Other(String),
}

/// Failure of a single remote-store operation.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("remote store unavailable: {0}")]
  Unavailable(String),
  #[error("remote store rejected the write: {0}")]
  Rejected(String),
  #[error("unknown session {0}")]
  UnknownSession(String),
}

/// Failure to write or read a run snapshot file.
#[derive(Debug, Error)]
pub enum SnapshotError {
  #[error("snapshot file {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("snapshot file {path} is not a valid snapshot: {source}")]
  Format {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

/// Invalid configuration value.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("unknown backend mode {0:?} (expected \"langgraph\" or \"gemini\")")]
  UnknownBackend(String),
  #[error("invalid value {value:?} for {key}")]
  InvalidValue { key: &'static str, value: String },
}
