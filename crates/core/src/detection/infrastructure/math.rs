//! Box geometry and non-maximum suppression for the YOLO decoder.

/// Candidate box in source-frame float coordinates before rounding.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub bbox: [f64; 4],
    pub class_id: u32,
    pub confidence: f64,
}

/// IoU between two bounding boxes represented as `[x1, y1, x2, y2]`.
pub fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

/// Class-aware greedy NMS: sort by confidence descending and suppress
/// lower-scored boxes of the same class that overlap a kept box.
///
/// The sort is stable, so equal scores keep their decode order.
pub fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];

    for i in 0..dets.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(dets[i].clone());
        for j in (i + 1)..dets.len() {
            if suppressed[j] || dets[j].class_id != dets[i].class_id {
                continue;
            }
            if bbox_iou(&dets[i].bbox, &dets[j].bbox) > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(bbox: [f64; 4], class_id: u32, confidence: f64) -> RawDetection {
        RawDetection {
            bbox,
            class_id,
            confidence,
        }
    }

    #[test]
    fn test_bbox_iou_no_overlap() {
        let a = [0.0, 0.0, 10.0, 10.0];
        let b = [20.0, 20.0, 30.0, 30.0];
        assert_eq!(bbox_iou(&a, &b), 0.0);
    }

    #[test]
    fn test_bbox_iou_perfect_overlap() {
        let a = [0.0, 0.0, 10.0, 10.0];
        assert!((bbox_iou(&a, &a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_bbox_iou_partial_overlap() {
        let a = [0.0, 0.0, 10.0, 10.0];
        let b = [5.0, 5.0, 15.0, 15.0];
        let expected = 25.0 / 175.0;
        assert!((bbox_iou(&a, &b) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_nms_suppresses_overlapping_same_class() {
        let mut dets = vec![
            raw([0.0, 0.0, 100.0, 100.0], 3, 0.8),
            raw([5.0, 5.0, 105.0, 105.0], 3, 0.9),
        ];
        let kept = nms(&mut dets, 0.45);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_nms_keeps_overlapping_different_classes() {
        let mut dets = vec![
            raw([0.0, 0.0, 100.0, 100.0], 0, 0.9),
            raw([5.0, 5.0, 105.0, 105.0], 3, 0.8),
        ];
        let kept = nms(&mut dets, 0.45);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_nms_keeps_non_overlapping() {
        let mut dets = vec![
            raw([0.0, 0.0, 50.0, 50.0], 1, 0.9),
            raw([200.0, 200.0, 250.0, 250.0], 1, 0.8),
        ];
        assert_eq!(nms(&mut dets, 0.45).len(), 2);
    }

    #[test]
    fn test_nms_empty_input() {
        let mut dets: Vec<RawDetection> = Vec::new();
        assert!(nms(&mut dets, 0.45).is_empty());
    }
}
