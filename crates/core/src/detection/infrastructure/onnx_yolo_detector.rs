/// YOLO object detector using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference, per-class score decoding and
/// NMS post-processing for an Ultralytics detection export.
use std::sync::Arc;

use crate::detection::domain::object_detector::{DetectionError, ObjectDetector};
use crate::shared::detection::{BoundingBox, Detection};
use crate::shared::frame::Frame;

use super::math::{nms, RawDetection};
use super::model_handle::ModelHandle;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// Leading box values per anchor: cx, cy, w, h.
const BOX_VALUES: usize = 4;

/// YOLO detector backed by a shared [`ModelHandle`].
///
/// Cloning is cheap; all clones share the same session.
#[derive(Clone)]
pub struct OnnxYoloDetector {
    model: Arc<ModelHandle>,
}

impl OnnxYoloDetector {
    pub fn new(model: Arc<ModelHandle>) -> Self {
        Self { model }
    }
}

impl ObjectDetector for OnnxYoloDetector {
    fn detect(&self, frame: &Frame, confidence: f64) -> Result<Vec<Detection>, DetectionError> {
        if frame.channels() != 3 || !frame.is_well_formed() {
            return Err(DetectionError::InvalidFrame(format!(
                "{}x{}x{} frame with {} bytes",
                frame.width(),
                frame.height(),
                frame.channels(),
                frame.data().len()
            )));
        }
        let Ok(model) = self.model.loaded() else {
            return Ok(Vec::new());
        };

        // 1. Preprocess: letterbox + normalize → NCHW float32
        let letterboxed = letterbox(frame, model.input_size);

        // 2. Inference
        let mut session = model
            .session
            .lock()
            .map_err(|_| DetectionError::Inference("session lock poisoned".into()))?;
        let input_value = ort::value::Tensor::from_array(letterboxed.tensor)
            .map_err(|e| DetectionError::Inference(e.to_string()))?;
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| DetectionError::Inference(e.to_string()))?;
        if outputs.len() == 0 {
            return Err(DetectionError::Inference("YOLO model produced no outputs".into()));
        }
        let tensor = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| DetectionError::Inference(e.to_string()))?;
        let shape = tensor.shape().to_vec();
        let data = tensor
            .as_slice()
            .ok_or_else(|| DetectionError::Inference("cannot get tensor slice".into()))?;

        // 3. Decode, then suppress duplicates
        let mut raw = decode(data, &shape, confidence, &letterboxed.geometry)?;
        let kept = nms(&mut raw, NMS_IOU_THRESH);

        Ok(kept
            .into_iter()
            .filter_map(|d| to_detection(&d, frame.width(), frame.height()))
            .collect())
    }

    fn is_available(&self) -> bool {
        self.model.is_loaded()
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Mapping from letterboxed model coordinates back to the source frame.
#[derive(Clone, Copy, Debug, PartialEq)]
struct LetterboxGeometry {
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

impl LetterboxGeometry {
    fn to_source(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.pad_x as f64) / self.scale,
            (y - self.pad_y as f64) / self.scale,
        )
    }
}

struct Letterboxed {
    tensor: ndarray::Array4<f32>,
    geometry: LetterboxGeometry,
}

/// Letterbox-resize a frame to `target_size` × `target_size`.
fn letterbox(frame: &Frame, target_size: u32) -> Letterboxed {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Padded area is 114/255 gray, the YOLO training convention.
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray(); // [H, W, C] u8
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    // Nearest-neighbor resize + copy into padded region
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    Letterboxed {
        tensor,
        geometry: LetterboxGeometry {
            scale,
            pad_x,
            pad_y,
        },
    }
}

// ---------------------------------------------------------------------------
// Postprocessing
// ---------------------------------------------------------------------------

/// Decodes a `[1, 4 + classes, anchors]` (or transposed) output into
/// candidate boxes in source-frame coordinates.
fn decode(
    data: &[f32],
    shape: &[usize],
    confidence: f64,
    geometry: &LetterboxGeometry,
) -> Result<Vec<RawDetection>, DetectionError> {
    if shape.len() != 3 {
        return Err(DetectionError::Inference(format!(
            "unexpected YOLO output shape: {shape:?}"
        )));
    }
    // More anchors than features in practice, so the smaller axis is features.
    let transposed = shape[1] < shape[2];
    let (num_anchors, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats <= BOX_VALUES || data.len() < num_anchors * num_feats {
        return Err(DetectionError::Inference(format!(
            "YOLO output has no class scores: {shape:?}"
        )));
    }
    let value = |anchor: usize, feat: usize| -> f32 {
        if transposed {
            data[feat * num_anchors + anchor]
        } else {
            data[anchor * num_feats + feat]
        }
    };

    let mut raw = Vec::new();
    for anchor in 0..num_anchors {
        let (class_id, score) = (BOX_VALUES..num_feats)
            .map(|f| (f - BOX_VALUES, value(anchor, f)))
            .fold((0usize, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
        let score = score as f64;
        if score < confidence {
            continue;
        }

        let cx = value(anchor, 0) as f64;
        let cy = value(anchor, 1) as f64;
        let w = value(anchor, 2) as f64;
        let h = value(anchor, 3) as f64;
        let (x1, y1) = geometry.to_source(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = geometry.to_source(cx + w / 2.0, cy + h / 2.0);

        raw.push(RawDetection {
            bbox: [x1, y1, x2, y2],
            class_id: class_id as u32,
            confidence: score,
        });
    }
    Ok(raw)
}

/// Rounds and clamps to the frame; boxes that collapse are dropped.
fn to_detection(raw: &RawDetection, frame_w: u32, frame_h: u32) -> Option<Detection> {
    let clamp_x = |v: f64| v.round().clamp(0.0, frame_w as f64) as i32;
    let clamp_y = |v: f64| v.round().clamp(0.0, frame_h as f64) as i32;
    let bbox = BoundingBox::new(
        clamp_x(raw.bbox[0]),
        clamp_y(raw.bbox[1]),
        clamp_x(raw.bbox[2]),
        clamp_y(raw.bbox[3]),
    )?;
    Some(Detection::new(raw.class_id, raw.confidence, bbox))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
