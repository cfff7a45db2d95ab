use serde::{Deserialize, Serialize};

use super::species::ClassLabel;

/// Axis-aligned box in source-frame pixel coordinates, `x1 < x2`, `y1 < y2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Returns `None` for empty or inverted boxes.
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Option<Self> {
        (x1 < x2 && y1 < y2).then_some(Self { x1, y1, x2, y2 })
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn as_tuple(&self) -> (i32, i32, i32, i32) {
        (self.x1, self.y1, self.x2, self.y2)
    }
}

/// One object found by a single detector invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    pub label: ClassLabel,
    /// Model score in `[0, 1]`.
    pub confidence: f64,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class_id: u32, confidence: f64, bbox: BoundingBox) -> Self {
        Self {
            class_id,
            label: ClassLabel::from_class_id(class_id),
            confidence,
            bbox,
        }
    }

    /// Confidence as a truncated integer percentage (0.679 → 67).
    pub fn confidence_percent(&self) -> u32 {
        (self.confidence.clamp(0.0, 1.0) * 100.0) as u32
    }
}
