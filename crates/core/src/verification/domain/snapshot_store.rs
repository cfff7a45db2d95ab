use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::detection::Detection;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("failed to write snapshot {path}: {reason}")]
    Write { path: PathBuf, reason: String },
    #[error("failed to read snapshot {path}: {reason}")]
    Read { path: PathBuf, reason: String },
    #[error("frame cannot be encoded: {0}")]
    InvalidFrame(String),
}

/// Durable storage for single-image snapshots.
pub trait SnapshotStore: Send + Sync {
    /// Persists the full frame, named after the detection and `source` tag.
    fn save(&self, frame: &Frame, detection: &Detection, source: &str)
        -> Result<PathBuf, SnapshotError>;

    /// Reads a snapshot back from storage.
    fn load(&self, path: &Path) -> Result<Frame, SnapshotError>;

    /// Removes the snapshot. Returns `false` when there was nothing to remove.
    fn delete(&self, path: &Path) -> bool;
}
