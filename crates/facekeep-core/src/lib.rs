//! facekeep-core — Face detection and recognition engine.
//!
//! Wraps the SeetaFace frontal detector (rustface) behind a boxed-face
//! adapter and implements an LBPH (Local Binary Pattern Histogram)
//! appearance recognizer with an atomically published model artifact.

pub mod detector;
pub mod recognizer;
pub mod types;

pub use detector::{DetectorError, FaceDetector};
pub use recognizer::{LbphModel, Prediction, RecognizerError, SAMPLE_SIZE};
pub use types::{dedupe_boxes, iou, FaceBox, DEDUPE_IOU_THRESHOLD};
