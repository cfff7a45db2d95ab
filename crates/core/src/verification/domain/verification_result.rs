use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::shared::detection::{BoundingBox, Detection};
use crate::shared::species::ClassLabel;

/// Why a verification attempt was not confirmed.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum RejectionReason {
    NoLayer1Detection,
    SnapshotSaveFailed,
    SnapshotReadFailed,
    NoLayer2Detection,
    SpeciesMismatch { layer1: ClassLabel, layer2: ClassLabel },
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::NoLayer1Detection => write!(f, "No Layer 1 detection"),
            RejectionReason::SnapshotSaveFailed => write!(f, "Snapshot save failed"),
            RejectionReason::SnapshotReadFailed => write!(f, "Snapshot read failed"),
            RejectionReason::NoLayer2Detection => write!(f, "No Layer 2 detection"),
            RejectionReason::SpeciesMismatch { layer1, layer2 } => {
                write!(f, "Species mismatch: L1={layer1}, L2={layer2}")
            }
        }
    }
}

/// Cross-layer summary for the confirmed species.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BestDetection {
    pub species: ClassLabel,
    pub confidence_layer1: f64,
    pub confidence_layer2: f64,
    pub bbox_layer1: BoundingBox,
    pub bbox_layer2: BoundingBox,
}

/// Outcome of one two-layer verification attempt.
///
/// A verified result always carries the retained snapshot and the best
/// detection; a rejected one always carries a reason and never a snapshot.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VerificationResult {
    layer1_detections: Vec<Detection>,
    layer2_detections: Vec<Detection>,
    snapshot_path: Option<PathBuf>,
    best_detection: Option<BestDetection>,
    rejection_reason: Option<RejectionReason>,
}

impl VerificationResult {
    pub fn verified(
        layer1_detections: Vec<Detection>,
        layer2_detections: Vec<Detection>,
        snapshot_path: PathBuf,
        best_detection: BestDetection,
    ) -> Self {
        Self {
            layer1_detections,
            layer2_detections,
            snapshot_path: Some(snapshot_path),
            best_detection: Some(best_detection),
            rejection_reason: None,
        }
    }

    pub fn rejected(
        layer1_detections: Vec<Detection>,
        layer2_detections: Vec<Detection>,
        reason: RejectionReason,
    ) -> Self {
        Self {
            layer1_detections,
            layer2_detections,
            snapshot_path: None,
            best_detection: None,
            rejection_reason: Some(reason),
        }
    }

    pub fn is_verified(&self) -> bool {
        self.rejection_reason.is_none()
    }

    pub fn layer1_detections(&self) -> &[Detection] {
        &self.layer1_detections
    }

    pub fn layer2_detections(&self) -> &[Detection] {
        &self.layer2_detections
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    pub fn best_detection(&self) -> Option<&BestDetection> {
        self.best_detection.as_ref()
    }

    pub fn rejection_reason(&self) -> Option<&RejectionReason> {
        self.rejection_reason.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::species::Species;
    use rstest::rstest;

    #[rstest]
    #[case(RejectionReason::NoLayer1Detection, "No Layer 1 detection")]
    #[case(RejectionReason::SnapshotSaveFailed, "Snapshot save failed")]
    #[case(RejectionReason::SnapshotReadFailed, "Snapshot read failed")]
    #[case(RejectionReason::NoLayer2Detection, "No Layer 2 detection")]
    #[case(
        RejectionReason::SpeciesMismatch {
            layer1: ClassLabel::Known(Species::Tiger),
            layer2: ClassLabel::Known(Species::Bear),
        },
        "Species mismatch: L1=Tiger, L2=Bear"
    )]
    #[case(
        RejectionReason::SpeciesMismatch {
            layer1: ClassLabel::Known(Species::Leopard),
            layer2: ClassLabel::Unknown(7),
        },
        "Species mismatch: L1=Leopard, L2=Class_7"
    )]
    fn test_reason_text(#[case] reason: RejectionReason, #[case] expected: &str) {
        assert_eq!(reason.to_string(), expected);
    }

    #[test]
    fn test_rejected_has_no_snapshot() {
        let result = VerificationResult::rejected(Vec::new(), Vec::new(), RejectionReason::NoLayer1Detection);
        assert!(!result.is_verified());
        assert!(result.snapshot_path().is_none());
        assert!(result.best_detection().is_none());
    }
}
