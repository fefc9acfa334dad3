//! Producers of the raw byte stream a session consumes.
//!
//! [HttpEventSource] posts the run request to the backend's streaming endpoint;
//! [ChannelSource] is fed by hand and backs tests and replay.

use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, instrument};

use crate::config::ClientConfig;
use crate::error::TransportError;

/// Chunked byte stream of one run; ends when the producer closes it.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Body of the request that starts a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
  pub task: String,
  pub max_iterations: u32,
}

/// Opens the event stream of one run.
#[async_trait]
pub trait EventSource: Send + Sync {
  async fn connect(&self, request: &RunRequest) -> Result<ByteStream, TransportError>;
}

/// Streams a run from the backend over HTTP.
#[derive(Debug, Clone)]
pub struct HttpEventSource {
  client: reqwest::Client,
  url: String,
}

impl HttpEventSource {
  pub fn new(config: &ClientConfig) -> Self {
    Self::with_client(reqwest::Client::new(), config.stream_url())
  }

  pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
    Self {
      client,
      url: url.into(),
    }
  }

  pub fn url(&self) -> &str {
    &self.url
  }
}

#[async_trait]
impl EventSource for HttpEventSource {
  #[instrument(level = "trace", skip(self), fields(url = %self.url))]
  async fn connect(&self, request: &RunRequest) -> Result<ByteStream, TransportError> {
    let response = self
      .client
      .post(&self.url)
      .header(reqwest::header::ACCEPT, "text/event-stream")
      .json(request)
      .send()
      .await
      .map_err(TransportError::Connect)?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(TransportError::Status {
        status: status.as_u16(),
        body,
      });
    }
    debug!(status = status.as_u16(), "event stream open");
    Ok(
      response
        .bytes_stream()
        .map(|chunk| chunk.map_err(TransportError::Read))
        .boxed(),
    )
  }
}

/// Sending half of a [ChannelSource].
pub type ChunkSender = mpsc::UnboundedSender<Result<Bytes, TransportError>>;

/// Single-use source whose chunks are pushed through a [ChunkSender].
///
/// The first `connect` takes the stream; later calls fail with
/// [TransportError::SourceClosed].
#[derive(Debug)]
pub struct ChannelSource {
  rx: Mutex<Option<mpsc::UnboundedReceiver<Result<Bytes, TransportError>>>>,
  requests: Mutex<Vec<RunRequest>>,
}

impl ChannelSource {
  pub fn new() -> (ChunkSender, Self) {
    let (tx, rx) = mpsc::unbounded_channel();
    let source = Self {
      rx: Mutex::new(Some(rx)),
      requests: Mutex::new(Vec::new()),
    };
    (tx, source)
  }

  /// Requests seen by `connect`, oldest first.
  pub fn requests(&self) -> Vec<RunRequest> {
    self
      .requests
      .lock()
      .map(|r| r.clone())
      .unwrap_or_default()
  }
}

#[async_trait]
impl EventSource for ChannelSource {
  async fn connect(&self, request: &RunRequest) -> Result<ByteStream, TransportError> {
    if let Ok(mut requests) = self.requests.lock() {
      requests.push(request.clone());
    }
    let rx = self
      .rx
      .lock()
      .map_err(|_| TransportError::Other("channel source lock poisoned".to_string()))?
      .take()
      .ok_or(TransportError::SourceClosed)?;
    Ok(UnboundedReceiverStream::new(rx).boxed())
  }
}
