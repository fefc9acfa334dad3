//! Frame decoder: turns an incremental byte stream of `data: <json>` lines into events.
//!
//! Lines are split on `\n` (a trailing `\r` is dropped). Bytes after the last newline are
//! buffered until the next chunk, so chunk boundaries never affect the decoded sequence.
//! Lines without the `data:` prefix (comments, `event:` fields, blank separators) are
//! skipped. A malformed data line becomes [Frame::Malformed] and decoding continues.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::instrument;

use crate::error::{DecodeError, TransportError};
use crate::types::{EventKind, EventRecord};

/// Prefix marking an event line.
pub const DATA_PREFIX: &str = "data:";

/// One decoded line.
#[derive(Debug)]
pub enum Frame {
  Event(EventRecord),
  /// The line was dropped; carried so the caller can log it.
  Malformed(DecodeError),
}

/// Wire envelope of one event line.
#[derive(Debug, Deserialize)]
struct Envelope {
  event: String,
  #[serde(default)]
  data: Value,
  #[serde(default)]
  timestamp: Option<String>,
}

/// Incremental line framer. Holds at most one partial line between calls.
#[derive(Debug, Default)]
pub struct FrameDecoder {
  pending: Vec<u8>,
}

impl FrameDecoder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Bytes buffered from an incomplete trailing line.
  pub fn buffered(&self) -> usize {
    self.pending.len()
  }

  /// Feeds a chunk, stamping decoded events with the current time.
  pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
    self.push_at(chunk, Utc::now())
  }

  /// Feeds a chunk, stamping decoded events with `received_at`.
  pub fn push_at(&mut self, chunk: &[u8], received_at: DateTime<Utc>) -> Vec<Frame> {
    self.pending.extend_from_slice(chunk);
    let mut frames = Vec::new();
    let mut start = 0;
    while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
      let end = start + offset;
      if let Some(frame) = decode_raw_line(&self.pending[start..end], received_at) {
        frames.push(frame);
      }
      start = end + 1;
    }
    self.pending.drain(..start);
    frames
  }

  /// Decodes whatever partial line remains at end of input.
  pub fn finish(&mut self) -> Vec<Frame> {
    self.finish_at(Utc::now())
  }

  pub fn finish_at(&mut self, received_at: DateTime<Utc>) -> Vec<Frame> {
    let rest = std::mem::take(&mut self.pending);
    decode_raw_line(&rest, received_at).into_iter().collect()
  }
}

fn decode_raw_line(raw: &[u8], received_at: DateTime<Utc>) -> Option<Frame> {
  let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
  match std::str::from_utf8(raw) {
    Ok(line) => decode_line(line, received_at),
    Err(e) if raw.starts_with(DATA_PREFIX.as_bytes()) => Some(Frame::Malformed(e.into())),
    Err(_) => None,
  }
}

/// Decodes one complete line. Returns `None` for lines that are not event lines.
#[instrument(level = "trace", skip(line))]
pub fn decode_line(line: &str, received_at: DateTime<Utc>) -> Option<Frame> {
  let body = line.strip_prefix(DATA_PREFIX)?.trim();
  if body.is_empty() {
    return None;
  }
  let envelope: Envelope = match serde_json::from_str(body) {
    Ok(envelope) => envelope,
    Err(source) => {
      return Some(Frame::Malformed(DecodeError::Json {
        line: line.to_string(),
        source,
      }));
    }
  };
  let payload = match envelope.data {
    Value::Object(map) => map,
    Value::Null => Map::new(),
    _ => {
      return Some(Frame::Malformed(DecodeError::NotAnObject {
        line: line.to_string(),
      }));
    }
  };
  let mut record = EventRecord::new(EventKind::from_tag(&envelope.event), payload, received_at);
  record.source_timestamp = envelope.timestamp;
  Some(Frame::Event(record))
}

/// Lazily decodes a chunked byte stream.
///
/// Transport errors are passed through and end the stream; the trailing partial line is
/// decoded when the input ends normally.
pub fn decode_stream<S>(chunks: S) -> impl Stream<Item = Result<Frame, TransportError>> + Send
where
  S: Stream<Item = Result<Bytes, TransportError>> + Send + 'static,
{
  async_stream::stream! {
    let mut decoder = FrameDecoder::new();
    let mut chunks = Box::pin(chunks);
    let mut failed = false;
    while let Some(chunk) = chunks.next().await {
      match chunk {
        Ok(bytes) => {
          for frame in decoder.push(&bytes) {
            yield Ok(frame);
          }
        }
        Err(e) => {
          failed = true;
          yield Err(e);
          break;
        }
      }
    }
    if !failed {
      for frame in decoder.finish() {
        yield Ok(frame);
      }
    }
  }
}
