use serde::{Deserialize, Serialize};

/// IoU threshold above which two detections are considered duplicates
/// of one another.
pub const DEDUPE_IOU_THRESHOLD: f64 = 0.35;

/// Guards the IoU denominator against degenerate zero-area boxes.
const IOU_EPSILON: f64 = 1e-6;

/// Axis-aligned face bounding box in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// `[x, y, width, height]` — the wire shape used in recognition replies.
    pub fn rect(&self) -> [u32; 4] {
        [self.x, self.y, self.width, self.height]
    }
}

/// Compute Intersection-over-Union between two face boxes.
///
/// Symmetric, in [0, 1]. A small epsilon in the denominator keeps the
/// result finite for degenerate boxes.
pub fn iou(a: &FaceBox, b: &FaceBox) -> f64 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter_w = x2.saturating_sub(x1) as f64;
    let inter_h = y2.saturating_sub(y1) as f64;
    let inter_area = inter_w * inter_h;
    if inter_area <= 0.0 {
        return 0.0;
    }

    let area_a = a.area() as f64;
    let area_b = b.area() as f64;
    inter_area / (area_a + area_b - inter_area + IOU_EPSILON)
}

/// Reduce overlapping candidate boxes to a non-overlapping set,
/// preferring larger boxes.
///
/// Candidates are sorted by area descending; a candidate is kept iff its
/// IoU with every already-kept box is strictly below `iou_threshold`.
/// Inputs of length <= 1 are returned unchanged.
pub fn dedupe_boxes(boxes: Vec<FaceBox>, iou_threshold: f64) -> Vec<FaceBox> {
    if boxes.len() <= 1 {
        return boxes;
    }

    let mut sorted = boxes;
    sorted.sort_by(|a, b| b.area().cmp(&a.area()));

    let mut kept: Vec<FaceBox> = Vec::with_capacity(sorted.len());
    for candidate in sorted {
        if kept.iter().all(|k| iou(&candidate, k) < iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_identical() {
        let a = FaceBox::new(0, 0, 100, 100);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = FaceBox::new(0, 0, 10, 10);
        let b = FaceBox::new(20, 20, 10, 10);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn test_iou_symmetric() {
        let a = FaceBox::new(0, 0, 100, 100);
        let b = FaceBox::new(30, 30, 100, 100);
        assert!((iou(&a, &b) - iou(&b, &a)).abs() < 1e-12);
    }

    #[test]
    fn test_iou_partial() {
        let a = FaceBox::new(0, 0, 10, 10);
        let b = FaceBox::new(5, 0, 10, 10);
        // Overlap: 5x10 = 50, union: 100+100-50 = 150
        let expected = 50.0 / 150.0;
        assert!((iou(&a, &b) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_dedupe_discards_overlapping_duplicate() {
        let a = FaceBox::new(0, 0, 100, 100);
        let b = FaceBox::new(10, 10, 100, 100);
        let c = FaceBox::new(500, 500, 50, 50);
        // A and B tie on area; the sort is stable, so A (first in input)
        // has priority and B is discarded as its duplicate.
        let result = dedupe_boxes(vec![a, b, c], DEDUPE_IOU_THRESHOLD);
        assert_eq!(result, vec![a, c]);
    }

    #[test]
    fn test_dedupe_prefers_larger() {
        let big = FaceBox::new(0, 0, 100, 100);
        let small = FaceBox::new(10, 10, 80, 80);
        let result = dedupe_boxes(vec![small, big], DEDUPE_IOU_THRESHOLD);
        assert_eq!(result, vec![big]);
    }

    #[test]
    fn test_dedupe_single_box_unchanged() {
        let a = FaceBox::new(3, 7, 40, 40);
        assert_eq!(dedupe_boxes(vec![a], DEDUPE_IOU_THRESHOLD), vec![a]);
        assert!(dedupe_boxes(vec![], DEDUPE_IOU_THRESHOLD).is_empty());
    }

    #[test]
    fn test_dedupe_keeps_low_overlap() {
        // IoU just under the threshold must keep both boxes
        let a = FaceBox::new(0, 0, 100, 100);
        let b = FaceBox::new(60, 0, 100, 100);
        // inter = 40*100 = 4000, union = 16000 → IoU = 0.25 < 0.35
        let result = dedupe_boxes(vec![a, b], DEDUPE_IOU_THRESHOLD);
        assert_eq!(result.len(), 2);
    }
}
