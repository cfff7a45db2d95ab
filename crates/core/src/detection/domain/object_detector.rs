use thiserror::Error;

use crate::shared::detection::Detection;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum DetectionError {
    /// The frame buffer does not describe a decodable RGB image.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Domain interface for object detection.
///
/// An unavailable model is an expected state, not an error: implementations
/// return `Ok(vec![])` and report `is_available() == false`. Errors are
/// reserved for problems with the input or the inference run itself.
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, frame: &Frame, confidence: f64) -> Result<Vec<Detection>, DetectionError>;

    fn is_available(&self) -> bool;
}
