use thiserror::Error;

use super::alert::Alert;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlertError {
    #[error("alert delivery failed: {0}")]
    Delivery(String),
    #[error("alert transport unavailable")]
    Unavailable,
}

/// Transport that delivers an alert to its recipient.
///
/// Called from the dispatcher's worker thread; may block.
pub trait AlertSink: Send + Sync {
    fn deliver(&self, alert: &Alert) -> Result<(), AlertError>;
}
