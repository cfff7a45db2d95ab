use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifies a live capture source.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraId {
    /// Local capture device by index (`0` is the default webcam).
    Device(u32),
    /// Network stream URL (RTSP, HTTP MJPEG, ...).
    Stream(String),
}

impl CameraId {
    /// Network streams arrive at a variable rate and resolution; local
    /// devices are opened at the requested size.
    pub fn is_stream(&self) -> bool {
        matches!(self, CameraId::Stream(_))
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraId::Device(index) => write!(f, "camera {index}"),
            CameraId::Stream(url) => write!(f, "{url}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("empty camera identifier")]
pub struct EmptyCameraId;

impl FromStr for CameraId {
    type Err = EmptyCameraId;

    /// All-digit strings select a local device, anything else is a URL.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(EmptyCameraId);
        }
        match s.parse::<u32>() {
            Ok(index) if s.bytes().all(|b| b.is_ascii_digit()) => Ok(CameraId::Device(index)),
            _ => Ok(CameraId::Stream(s.to_string())),
        }
    }
}
