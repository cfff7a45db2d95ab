//! Two-layer verification over a persisted snapshot.
//!
//! Layer 1 runs on the live frame at the coarse threshold. Its best
//! detection names the snapshot, which is written to the store and read
//! back; layer 2 runs on that re-read image at the confirmatory threshold.
//! The attempt is verified only when both layers agree on the species.
//! Every rejection after the save removes the snapshot again, so a snapshot
//! outlives `verify` only when it backs a verified result.
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::detection::domain::detection_set::highest_confidence;
use crate::detection::domain::object_detector::{DetectionError, ObjectDetector};
use crate::shared::detection::Detection;
use crate::shared::frame::Frame;
use crate::shared::settings::Thresholds;

use super::domain::snapshot_store::SnapshotStore;
use super::domain::verification_result::{BestDetection, RejectionReason, VerificationResult};

/// Source tag for snapshots written during verification.
pub const VERIFICATION_SOURCE: &str = "verification";

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("layer {layer} detection failed: {source}")]
    Detection {
        layer: u8,
        #[source]
        source: DetectionError,
    },
}

pub struct Verifier {
    detector: Arc<dyn ObjectDetector>,
    store: Arc<dyn SnapshotStore>,
    thresholds: Thresholds,
}

impl Verifier {
    pub fn new(
        detector: Arc<dyn ObjectDetector>,
        store: Arc<dyn SnapshotStore>,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            detector,
            store,
            thresholds,
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// True iff the best detection reaches the auto-snapshot threshold.
    pub fn should_trigger_snapshot(&self, detections: &[Detection]) -> bool {
        highest_confidence(detections).is_some_and(|d| d.confidence >= self.thresholds.auto_snapshot)
    }

    /// Runs both layers on `frame`.
    ///
    /// Rejections are ordinary results. `Err` is returned only when the
    /// detector itself fails, after any snapshot written so far is removed.
    pub fn verify(&self, frame: &Frame) -> Result<VerificationResult, VerifyError> {
        let layer1 = self
            .detector
            .detect(frame, self.thresholds.layer1)
            .map_err(|source| VerifyError::Detection { layer: 1, source })?;

        let Some(best1) = highest_confidence(&layer1).cloned() else {
            return Ok(self.reject(layer1, Vec::new(), RejectionReason::NoLayer1Detection));
        };

        let snapshot = match self.store.save(frame, &best1, VERIFICATION_SOURCE) {
            Ok(path) => path,
            Err(e) => {
                log::warn!("Snapshot save failed: {e}");
                return Ok(self.reject(layer1, Vec::new(), RejectionReason::SnapshotSaveFailed));
            }
        };

        let reloaded = match self.store.load(&snapshot) {
            Ok(image) => image,
            Err(e) => {
                log::warn!("Snapshot read failed: {e}");
                self.discard(&snapshot);
                return Ok(self.reject(layer1, Vec::new(), RejectionReason::SnapshotReadFailed));
            }
        };

        let layer2 = match self.detector.detect(&reloaded, self.thresholds.layer2) {
            Ok(detections) => detections,
            Err(source) => {
                self.discard(&snapshot);
                return Err(VerifyError::Detection { layer: 2, source });
            }
        };

        let Some(best2) = highest_confidence(&layer2).cloned() else {
            self.discard(&snapshot);
            return Ok(self.reject(layer1, layer2, RejectionReason::NoLayer2Detection));
        };

        if best1.label != best2.label {
            self.discard(&snapshot);
            let reason = RejectionReason::SpeciesMismatch {
                layer1: best1.label,
                layer2: best2.label,
            };
            return Ok(self.reject(layer1, layer2, reason));
        }

        log::info!(
            "Verified {} (L1 {:.1}%, L2 {:.1}%) -> {}",
            best1.label,
            best1.confidence * 100.0,
            best2.confidence * 100.0,
            snapshot.display()
        );
        let best = BestDetection {
            species: best1.label,
            confidence_layer1: best1.confidence,
            confidence_layer2: best2.confidence,
            bbox_layer1: best1.bbox,
            bbox_layer2: best2.bbox,
        };
        Ok(VerificationResult::verified(layer1, layer2, snapshot, best))
    }

    fn reject(
        &self,
        layer1: Vec<Detection>,
        layer2: Vec<Detection>,
        reason: RejectionReason,
    ) -> VerificationResult {
        log::info!("Verification rejected: {reason}");
        VerificationResult::rejected(layer1, layer2, reason)
    }

    fn discard(&self, snapshot: &Path) {
        if !self.store.delete(snapshot) {
            log::warn!("Snapshot {} was already gone", snapshot.display());
        }
    }
}
