//! Face detector adapter over the SeetaFace frontal cascade (rustface).
//!
//! Preprocesses frames (histogram equalization), applies an adaptive
//! minimum face size, runs the underlying detector and deduplicates the
//! returned boxes.

use crate::types::{dedupe_boxes, FaceBox, DEDUPE_IOU_THRESHOLD};
use image::GrayImage;
use std::path::Path;
use thiserror::Error;

// --- Detection tuning (fixed so every entry point detects identically) ---

/// Scale step between pyramid levels. The underlying detector takes the
/// inverse (shrink) factor.
const SCALE_FACTOR: f32 = 1.08;
/// Classifier score gate. Plays the role a cascade min-neighbors count
/// does: higher = stricter, fewer spurious hits.
const SCORE_THRESHOLD: f64 = 6.0;
/// Absolute lower bound on the adaptive minimum face side, in pixels.
const MIN_FACE_FLOOR: u32 = 80;
/// Fraction of the shorter image side used for the adaptive minimum.
const MIN_FACE_FRACTION: f32 = 0.2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector model file not found: {0}")]
    ModelNotFound(String),
    #[error("failed to load detector model: {0}")]
    ModelLoad(String),
}

/// Adapter around the external face-box detector.
///
/// Holds detector state that is not `Send`; callers keep one instance per
/// worker thread (the daemon owns it on a dedicated engine thread).
pub struct FaceDetector {
    inner: Box<dyn rustface::Detector>,
}

impl FaceDetector {
    /// Open the detector model at `model_path`.
    ///
    /// The model file is checked here, at detection time, not at process
    /// startup: a missing model fails the individual request, never the
    /// daemon.
    pub fn open(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        let inner = rustface::create_detector(&model_path.to_string_lossy())
            .map_err(|e| DetectorError::ModelLoad(e.to_string()))?;

        tracing::info!(path = %model_path.display(), "face detector model loaded");
        Ok(Self { inner })
    }

    /// Detect face boxes in a grayscale frame.
    ///
    /// No ordering guarantee — callers wanting the largest face re-sort.
    pub fn detect(&mut self, gray: &GrayImage) -> Vec<FaceBox> {
        // Equalize contrast first; detection under uneven lighting is
        // noticeably better on the flattened histogram.
        let equalized = imageproc::contrast::equalize_histogram(gray);
        let (width, height) = equalized.dimensions();

        // Adaptive minimum face side: suppress small spurious detections
        // on large frames while still allowing low-resolution input.
        let min_side =
            ((width.min(height) as f32 * MIN_FACE_FRACTION) as u32).max(MIN_FACE_FLOOR);

        self.inner.set_min_face_size(min_side);
        self.inner.set_score_thresh(SCORE_THRESHOLD);
        self.inner.set_pyramid_scale_factor(1.0 / SCALE_FACTOR);

        let mut frame = rustface::ImageData::new(equalized.as_raw(), width, height);
        let hits = self.inner.detect(&mut frame);

        let boxes: Vec<FaceBox> = hits
            .iter()
            .map(|info| {
                let b = info.bbox();
                FaceBox {
                    x: b.x().max(0) as u32,
                    y: b.y().max(0) as u32,
                    width: b.width(),
                    height: b.height(),
                }
            })
            .filter(|b| b.width > 0 && b.height > 0)
            .collect();

        // The cascade sometimes reports several boxes for one face.
        dedupe_boxes(boxes, DEDUPE_IOU_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_model() {
        let err = FaceDetector::open(Path::new("/nonexistent/model.bin"))
            .err()
            .expect("open must fail for a missing model file");
        assert!(matches!(err, DetectorError::ModelNotFound(_)));
    }

    #[test]
    fn test_adaptive_min_face_side() {
        // Mirrors the computation in detect(): max(80, 0.2 * min side).
        let min_side = |w: u32, h: u32| ((w.min(h) as f32 * MIN_FACE_FRACTION) as u32)
            .max(MIN_FACE_FLOOR);
        // Low resolution: floor applies
        assert_eq!(min_side(320, 240), 80);
        // High resolution: fraction applies
        assert_eq!(min_side(1920, 1080), 216);
        assert_eq!(min_side(4000, 3000), 600);
    }
}
