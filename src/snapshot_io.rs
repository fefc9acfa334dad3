//! Run snapshot export to disk.
//!
//! Snapshots are written to a sibling temporary file and renamed into place, so a reader never
//! sees a partially written file and an existing snapshot survives a failed write.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::error::SnapshotError;
use crate::types::RunSnapshot;

/// File name used when a snapshot is written into a directory.
pub const SNAPSHOT_FILENAME: &str = "run_snapshot.json";

/// Path of the snapshot file inside `dir`.
pub fn snapshot_path(dir: &Path) -> PathBuf {
  dir.join(SNAPSHOT_FILENAME)
}

fn staging_path(path: &Path) -> PathBuf {
  let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
  name.push(".tmp");
  path.with_file_name(name)
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SnapshotError + use<> {
  let path = path.to_path_buf();
  move |source| SnapshotError::Io { path, source }
}

/// Writes `snapshot` to `path` as pretty JSON, creating parent directories.
#[instrument(level = "trace", skip(snapshot))]
pub fn save_snapshot(path: &Path, snapshot: &RunSnapshot) -> Result<(), SnapshotError> {
  let json = serde_json::to_vec_pretty(snapshot).map_err(|source| SnapshotError::Format {
    path: path.to_path_buf(),
    source,
  })?;
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).map_err(io_error(parent))?;
  }
  let staging = staging_path(path);
  fs::write(&staging, json).map_err(io_error(&staging))?;
  if let Err(e) = fs::rename(&staging, path) {
    let _ = fs::remove_file(&staging);
    return Err(io_error(path)(e));
  }
  debug!(path = %path.display(), "snapshot saved");
  Ok(())
}

/// Reads a snapshot written by [save_snapshot].
#[instrument(level = "trace")]
pub fn load_snapshot(path: &Path) -> Result<RunSnapshot, SnapshotError> {
  let bytes = fs::read(path).map_err(io_error(path))?;
  serde_json::from_slice(&bytes).map_err(|source| SnapshotError::Format {
    path: path.to_path_buf(),
    source,
  })
}
