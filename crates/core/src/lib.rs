//! Wildlife detection with two-layer verification.
//!
//! Bounded contexts, each split into `domain` (traits, value types) and
//! `infrastructure` (ONNX Runtime, ffmpeg, filesystem adapters):
//!
//! - [`detection`]: object detector, model handle, box rendering
//! - [`capture`]: live frame sources
//! - [`verification`]: snapshot store and the two-layer verifier
//! - [`records`]: persisted detection records
//! - [`alerts`]: notifications with per-species cooldown
//!
//! [`pipeline`] holds the use cases that wire them together.
pub mod alerts;
pub mod capture;
pub mod detection;
pub mod pipeline;
pub mod records;
pub mod shared;
pub mod verification;
