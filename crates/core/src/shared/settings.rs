use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::constants::*;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Explicit weights file. When unset the model is resolved from the
    /// user cache, downloading it on first use.
    pub path: Option<PathBuf>,
    /// Where to fetch the weights when neither `path` nor the cache has
    /// them. Unset means the weights must be supplied locally.
    pub url: Option<String>,
    pub inference_size: u32,
    pub intra_threads: Option<usize>,
    pub platform_providers: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            path: None,
            url: None,
            inference_size: DEFAULT_INFERENCE_SIZE,
            intra_threads: None,
            platform_providers: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub layer1: f64,
    pub layer2: f64,
    pub auto_snapshot: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            layer1: DEFAULT_LAYER1_CONFIDENCE,
            layer2: DEFAULT_LAYER2_CONFIDENCE,
            auto_snapshot: DEFAULT_AUTO_SNAPSHOT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub process_every_n_frames: usize,
    pub verification_cooldown_secs: u64,
    /// Apply the verification cooldown to local devices as well as streams.
    pub cooldown_all_sources: bool,
    pub max_consecutive_read_failures: u32,
    /// Upper bound on a single blocking read from a network stream.
    pub read_timeout_secs: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            width: DEFAULT_CAPTURE_WIDTH,
            height: DEFAULT_CAPTURE_HEIGHT,
            fps: DEFAULT_CAPTURE_FPS,
            process_every_n_frames: DEFAULT_PROCESS_EVERY_N_FRAMES,
            verification_cooldown_secs: DEFAULT_VERIFICATION_COOLDOWN_SECS,
            cooldown_all_sources: false,
            max_consecutive_read_failures: 5,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSettings {
    pub directory: PathBuf,
    pub jpeg_quality: u8,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("snapshots"),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub cooldown_secs: u64,
    pub recipient: String,
    pub location: String,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            cooldown_secs: DEFAULT_ALERT_COOLDOWN_SECS,
            recipient: "ranger@localhost".to_string(),
            location: DEFAULT_LOCATION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordSettings {
    pub path: PathBuf,
}

impl Default for RecordSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("detections.jsonl"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model: ModelSettings,
    pub thresholds: Thresholds,
    pub capture: CaptureSettings,
    pub snapshots: SnapshotSettings,
    pub alerts: AlertSettings,
    pub records: RecordSettings,
}

impl Settings {
    /// `<config dir>/WildVision/settings.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("WildVision").join("settings.json"))
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let json = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings =
            serde_json::from_str(&json).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads `path` if it exists, otherwise returns defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("No settings at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let write_err = |source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| write_err(std::io::Error::other(e)))?;
        fs::write(path, json).map_err(write_err)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let t = &self.thresholds;
        for (field, value) in [
            ("thresholds.layer1", t.layer1),
            ("thresholds.layer2", t.layer2),
            ("thresholds.auto_snapshot", t.auto_snapshot),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SettingsError::Invalid {
                    field,
                    reason: format!("must be between 0.0 and 1.0, got {value}"),
                });
            }
        }
        if self.capture.process_every_n_frames == 0 {
            return Err(SettingsError::Invalid {
                field: "capture.process_every_n_frames",
                reason: "must be >= 1".into(),
            });
        }
        if self.capture.read_timeout_secs == 0 {
            return Err(SettingsError::Invalid {
                field: "capture.read_timeout_secs",
                reason: "must be >= 1".into(),
            });
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(SettingsError::Invalid {
                field: "capture.width/height",
                reason: "must be non-zero".into(),
            });
        }
        if self.model.inference_size == 0 || self.model.inference_size % 32 != 0 {
            return Err(SettingsError::Invalid {
                field: "model.inference_size",
                reason: format!(
                    "must be a positive multiple of 32, got {}",
                    self.model.inference_size
                ),
            });
        }
        if !(1..=100).contains(&self.snapshots.jpeg_quality) {
            return Err(SettingsError::Invalid {
                field: "snapshots.jpeg_quality",
                reason: format!("must be 1-100, got {}", self.snapshots.jpeg_quality),
            });
        }
        Ok(())
    }
}
