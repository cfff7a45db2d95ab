use std::path::Path;
use std::sync::Arc;

use crate::detection::infrastructure::box_renderer::BoxRenderer;
use crate::records::domain::detection_record::DetectionSource;
use crate::shared::frame::Frame;
use crate::verification::domain::verification_result::VerificationResult;
use crate::verification::verifier::Verifier;

use super::detection_recorder::{DetectionRecorder, RecordingOutcome};

pub struct InspectionReport {
    pub result: VerificationResult,
    pub recording: RecordingOutcome,
}

/// Single uploaded image: read → verify → record → optionally annotate.
pub struct InspectImageUseCase {
    verifier: Arc<Verifier>,
    recorder: DetectionRecorder,
    renderer: Arc<BoxRenderer>,
}

impl InspectImageUseCase {
    pub fn new(verifier: Arc<Verifier>, recorder: DetectionRecorder, renderer: Arc<BoxRenderer>) -> Self {
        Self {
            verifier,
            recorder,
            renderer,
        }
    }

    /// Writes the layer-2 boxes over the input to `annotated_path` when the
    /// image was verified and a path is given.
    pub fn execute(
        &self,
        input_path: &Path,
        annotated_path: Option<&Path>,
    ) -> Result<InspectionReport, Box<dyn std::error::Error>> {
        let image = image::open(input_path)?.to_rgb8();
        let frame = Frame::from_rgb_image(image, 0);

        let result = self.verifier.verify(&frame)?;
        let recording = self.recorder.record(&result, DetectionSource::Upload);

        if let (true, Some(out)) = (result.is_verified(), annotated_path) {
            let annotated = self.renderer.draw_boxes(&frame, result.layer2_detections());
            let img = annotated
                .to_rgb_image()
                .ok_or("annotated frame has an invalid buffer")?;
            if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            img.save(out)?;
        }

        Ok(InspectionReport { result, recording })
    }
}
