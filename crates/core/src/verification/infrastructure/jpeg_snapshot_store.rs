use std::fs::{self, OpenOptions};
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local};
use image::codecs::jpeg::JpegEncoder;

use crate::shared::constants::DEFAULT_JPEG_QUALITY;
use crate::shared::detection::Detection;
use crate::shared::frame::Frame;
use crate::verification::domain::snapshot_store::{SnapshotError, SnapshotStore};

/// Name clashes tolerated before a save gives up.
const MAX_NAME_ATTEMPTS: i64 = 1000;

/// Stores snapshots as JPEG files in one directory.
///
/// Names follow `{YYYYMMDD_HHMMSS_mmm}_{species}_{percent}_{source}.jpg`
/// using local time. Files are created exclusively: when the name is taken
/// the millisecond stamp moves forward until a free one is found, so a save
/// never replaces an existing snapshot.
pub struct JpegSnapshotStore {
    directory: PathBuf,
    quality: u8,
}

impl JpegSnapshotStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    fn save_at(
        &self,
        at: DateTime<Local>,
        frame: &Frame,
        detection: &Detection,
        source: &str,
    ) -> Result<PathBuf, SnapshotError> {
        let img = frame
            .to_rgb_image()
            .ok_or_else(|| SnapshotError::InvalidFrame(format!("{}x{}", frame.width(), frame.height())))?;

        fs::create_dir_all(&self.directory).map_err(|e| SnapshotError::Write {
            path: self.directory.clone(),
            reason: e.to_string(),
        })?;
        let (path, file) = self.create_unique(at, detection, source)?;

        let encoded = JpegEncoder::new_with_quality(BufWriter::new(file), self.quality)
            .encode_image(&img);
        if let Err(e) = encoded {
            // A half-written JPEG must not outlive the failed save.
            let _ = fs::remove_file(&path);
            return Err(SnapshotError::Write {
                path,
                reason: e.to_string(),
            });
        }

        log::debug!("Saved snapshot {}", path.display());
        Ok(path)
    }

    fn create_unique(
        &self,
        at: DateTime<Local>,
        detection: &Detection,
        source: &str,
    ) -> Result<(PathBuf, fs::File), SnapshotError> {
        let mut last = self.directory.join(snapshot_file_name(at, detection, source));
        for step in 0..MAX_NAME_ATTEMPTS {
            let path = self
                .directory
                .join(snapshot_file_name(at + Duration::milliseconds(step), detection, source));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => last = path,
                Err(e) => {
                    return Err(SnapshotError::Write {
                        path,
                        reason: e.to_string(),
                    })
                }
            }
        }
        Err(SnapshotError::Write {
            path: last,
            reason: "no free snapshot name".into(),
        })
    }
}

pub fn snapshot_file_name(at: DateTime<Local>, detection: &Detection, source: &str) -> String {
    format!(
        "{}_{}_{}_{}.jpg",
        at.format("%Y%m%d_%H%M%S_%3f"),
        detection.label,
        detection.confidence_percent(),
        source
    )
}

impl SnapshotStore for JpegSnapshotStore {
    fn save(&self, frame: &Frame, detection: &Detection, source: &str) -> Result<PathBuf, SnapshotError> {
        self.save_at(Local::now(), frame, detection, source)
    }

    fn load(&self, path: &Path) -> Result<Frame, SnapshotError> {
        let img = image::open(path).map_err(|e| SnapshotError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Frame::from_rgb_image(img.to_rgb8(), 0))
    }

    fn delete(&self, path: &Path) -> bool {
        match fs::remove_file(path) {
            Ok(()) => {
                log::debug!("Deleted snapshot {}", path.display());
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                log::warn!("Could not delete snapshot {}: {e}", path.display());
                false
            }
        }
    }
}
