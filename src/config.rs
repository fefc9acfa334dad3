//! Client and synchronization configuration.
//!
//! Defaults match the reference deployment; [ClientConfig::from_env] overlays
//! `RUNMIRROR_*` environment variables.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::DEFAULT_TRACE_CAP;

pub const ENV_BASE_URL: &str = "RUNMIRROR_BASE_URL";
pub const ENV_BACKEND: &str = "RUNMIRROR_BACKEND";
pub const ENV_MAX_ITERATIONS: &str = "RUNMIRROR_MAX_ITERATIONS";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_MAX_ITERATIONS: u32 = 7;

/// Which backend endpoint streams the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
  #[default]
  Langgraph,
  Gemini,
}

impl BackendMode {
  /// Request path of the streaming endpoint.
  pub fn stream_path(self) -> &'static str {
    match self {
      BackendMode::Langgraph => "/api/runs/stream",
      BackendMode::Gemini => "/api/research/gemini/stream",
    }
  }
}

impl fmt::Display for BackendMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BackendMode::Langgraph => write!(f, "langgraph"),
      BackendMode::Gemini => write!(f, "gemini"),
    }
  }
}

impl FromStr for BackendMode {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "langgraph" => Ok(BackendMode::Langgraph),
      "gemini" => Ok(BackendMode::Gemini),
      _ => Err(ConfigError::UnknownBackend(s.to_string())),
    }
  }
}

/// Timing and sizing of outbound remote writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Quiet window before the latest draft is written.
  pub draft_debounce_ms: u64,
  /// Quiet window before the latest diagram is written.
  pub diagram_debounce_ms: u64,
  /// Records written per flush cycle.
  pub batch_size: usize,
  /// Pause between flush cycles while records remain queued.
  pub batch_delay_ms: u64,
  /// In-memory trace entries kept per session.
  pub trace_cap: usize,
}

impl SyncConfig {
  pub fn draft_debounce(&self) -> Duration {
    Duration::from_millis(self.draft_debounce_ms)
  }

  pub fn diagram_debounce(&self) -> Duration {
    Duration::from_millis(self.diagram_debounce_ms)
  }

  pub fn batch_delay(&self) -> Duration {
    Duration::from_millis(self.batch_delay_ms)
  }
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      draft_debounce_ms: 1000,
      diagram_debounce_ms: 500,
      batch_size: 5,
      batch_delay_ms: 300,
      trace_cap: DEFAULT_TRACE_CAP,
    }
  }
}

/// Everything needed to observe one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
  pub base_url: String,
  pub backend: BackendMode,
  pub max_iterations: u32,
  pub sync: SyncConfig,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      base_url: DEFAULT_BASE_URL.to_string(),
      backend: BackendMode::default(),
      max_iterations: DEFAULT_MAX_ITERATIONS,
      sync: SyncConfig::default(),
    }
  }
}

impl ClientConfig {
  /// Defaults overlaid with the process environment.
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::default().with_overrides(|key| std::env::var(key).ok())
  }

  /// Overlays values returned by `lookup` for the `RUNMIRROR_*` keys.
  pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    if let Some(url) = lookup(ENV_BASE_URL).filter(|s| !s.trim().is_empty()) {
      self.base_url = url.trim().to_string();
    }
    if let Some(backend) = lookup(ENV_BACKEND) {
      self.backend = backend.parse()?;
    }
    if let Some(raw) = lookup(ENV_MAX_ITERATIONS) {
      self.max_iterations = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
          key: ENV_MAX_ITERATIONS,
          value: raw.clone(),
        })?;
    }
    Ok(self)
  }

  /// Full URL of the streaming endpoint for the configured backend.
  pub fn stream_url(&self) -> String {
    format!(
      "{}{}",
      self.base_url.trim_end_matches('/'),
      self.backend.stream_path()
    )
  }
}
