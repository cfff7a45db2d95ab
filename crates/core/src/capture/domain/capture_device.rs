use std::time::Duration;

use thiserror::Error;

use crate::shared::frame::Frame;

use super::camera_id::CameraId;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("failed to open {camera}: {reason}")]
    Open { camera: String, reason: String },
    #[error("failed to decode frame: {0}")]
    Decode(String),
    #[error("capture device is not open")]
    NotOpen,
    #[error("end of stream")]
    EndOfStream,
}

/// Parameters requested when opening a device.
///
/// Local devices honour the size and rate; network streams deliver
/// whatever the remote end encodes and only use the timeout.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureRequest {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub read_timeout: Duration,
}

/// Pull-based access to a live video source.
pub trait CaptureDevice: Send {
    fn open(&mut self, camera: &CameraId, request: &CaptureRequest) -> Result<(), CaptureError>;

    fn is_open(&self) -> bool;

    /// Blocks until the next frame is decoded.
    fn read(&mut self) -> Result<Frame, CaptureError>;

    /// Releases the handle. Safe to call repeatedly.
    fn release(&mut self);
}
