//! LBPH (Local Binary Pattern Histogram) face recognizer.
//!
//! Circular LBP codes with bilinear sampling, spatial grid histograms and
//! chi-square nearest-neighbor prediction. The trained model serializes to
//! a single JSON artifact, published with write-to-temp + atomic rename so
//! concurrent readers never observe a partial file.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

// --- LBPH hyperparameters (fixed; every entry point trains identical models) ---
const LBP_RADIUS: f32 = 1.0;
const LBP_NEIGHBORS: usize = 8;
const GRID_X: usize = 8;
const GRID_Y: usize = 8;
/// Histogram bins per grid cell: one per possible LBP code.
const HIST_BINS: usize = 1 << LBP_NEIGHBORS;

/// Side length of the normalized face crops the recognizer operates on.
pub const SAMPLE_SIZE: u32 = 200;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("cannot train on an empty sample set")]
    EmptyTrainingSet,
    #[error("training images and labels differ in length ({images} vs {labels})")]
    LabelMismatch { images: usize, labels: usize },
    #[error("corrupt model artifact: {0}")]
    Artifact(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Nearest-neighbor prediction: the closest enrolled label and its
/// dissimilarity (lower = more similar).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: u32,
    pub distance: f64,
}

/// Serialized state of a trained LBPH recognizer.
///
/// One spatial histogram per training sample plus its label id; prediction
/// is a full scan for the minimum chi-square distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LbphModel {
    radius: f32,
    neighbors: usize,
    grid_x: usize,
    grid_y: usize,
    histograms: Vec<Vec<f32>>,
    labels: Vec<u32>,
}

impl LbphModel {
    /// Fit a model over the full training set in a single batch pass.
    pub fn train(images: &[GrayImage], labels: &[u32]) -> Result<Self, RecognizerError> {
        if images.is_empty() {
            return Err(RecognizerError::EmptyTrainingSet);
        }
        if images.len() != labels.len() {
            return Err(RecognizerError::LabelMismatch {
                images: images.len(),
                labels: labels.len(),
            });
        }

        let histograms = images.iter().map(spatial_histogram).collect();
        Ok(Self {
            radius: LBP_RADIUS,
            neighbors: LBP_NEIGHBORS,
            grid_x: GRID_X,
            grid_y: GRID_Y,
            histograms,
            labels: labels.to_vec(),
        })
    }

    /// Predict the nearest enrolled label for a normalized face crop.
    ///
    /// Returns `None` only for a model with no samples, which `train`
    /// refuses to produce; defensive callers treat it as unknown.
    pub fn predict(&self, face: &GrayImage) -> Option<Prediction> {
        let probe = spatial_histogram(face);
        let mut best: Option<Prediction> = None;

        for (hist, &label) in self.histograms.iter().zip(&self.labels) {
            let distance = chi_square(hist, &probe);
            let better = match best {
                None => true,
                Some(b) => distance < b.distance,
            };
            if better {
                best = Some(Prediction { label, distance });
            }
        }
        best
    }

    /// Number of training samples the model was fitted on.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Atomically publish the artifact at `path`.
    ///
    /// Serializes to `<path>.tmp` and renames over the canonical path, so a
    /// concurrent `load` sees either the old or the new artifact in full.
    pub fn save(&self, path: &Path) -> Result<(), RecognizerError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = std::path::PathBuf::from(tmp);

        let encoded = serde_json::to_vec(self)
            .map_err(|e| RecognizerError::Artifact(e.to_string()))?;
        fs::write(&tmp, encoded)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Load the current artifact, or `None` when no model has been
    /// published yet (the cold-start state, which is valid).
    pub fn load(path: &Path) -> Result<Option<Self>, RecognizerError> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let model = serde_json::from_slice(&bytes)
            .map_err(|e| RecognizerError::Artifact(e.to_string()))?;
        Ok(Some(model))
    }
}

/// Compute the circular LBP code image.
///
/// Neighbors are sampled on a circle of `LBP_RADIUS` with bilinear
/// interpolation; a bit is set when the sample is >= the center pixel.
/// The code image covers the interior region (a one-radius border is
/// dropped).
fn lbp_codes(img: &GrayImage) -> (Vec<u8>, usize, usize) {
    let w = img.width() as usize;
    let h = img.height() as usize;
    let r = LBP_RADIUS.ceil() as usize;
    if w <= 2 * r || h <= 2 * r {
        return (Vec::new(), 0, 0);
    }

    let cw = w - 2 * r;
    let ch = h - 2 * r;
    let data = img.as_raw();

    // Precompute sampling offsets around the circle.
    let mut offsets = [(0.0f32, 0.0f32); LBP_NEIGHBORS];
    for (n, off) in offsets.iter_mut().enumerate() {
        let angle = 2.0 * std::f32::consts::PI * n as f32 / LBP_NEIGHBORS as f32;
        *off = (LBP_RADIUS * angle.cos(), -(LBP_RADIUS * angle.sin()));
    }

    let mut codes = vec![0u8; cw * ch];
    for cy in 0..ch {
        let y = cy + r;
        for cx in 0..cw {
            let x = cx + r;
            let center = data[y * w + x] as f32;
            let mut code = 0u8;
            for (n, &(dx, dy)) in offsets.iter().enumerate() {
                let sx = x as f32 + dx;
                let sy = y as f32 + dy;
                // Clamp so the 2x2 interpolation window stays in bounds
                // when a sample lands exactly on the last row/column.
                let x0 = (sx.floor() as usize).min(w - 2);
                let y0 = (sy.floor() as usize).min(h - 2);
                let fx = (sx - x0 as f32).clamp(0.0, 1.0);
                let fy = (sy - y0 as f32).clamp(0.0, 1.0);

                let tl = data[y0 * w + x0] as f32;
                let tr = data[y0 * w + x0 + 1] as f32;
                let bl = data[(y0 + 1) * w + x0] as f32;
                let br = data[(y0 + 1) * w + x0 + 1] as f32;
                let sample = tl * (1.0 - fx) * (1.0 - fy)
                    + tr * fx * (1.0 - fy)
                    + bl * (1.0 - fx) * fy
                    + br * fx * fy;

                if sample >= center {
                    code |= 1 << n;
                }
            }
            codes[cy * cw + cx] = code;
        }
    }
    (codes, cw, ch)
}

/// Concatenated per-cell histograms over a GRID_X x GRID_Y partition of
/// the LBP code image, each cell normalized to unit mass.
fn spatial_histogram(img: &GrayImage) -> Vec<f32> {
    let (codes, cw, ch) = lbp_codes(img);
    let mut hist = vec![0.0f32; GRID_X * GRID_Y * HIST_BINS];
    if codes.is_empty() {
        return hist;
    }

    let cell_w = cw / GRID_X;
    let cell_h = ch / GRID_Y;
    if cell_w == 0 || cell_h == 0 {
        return hist;
    }
    let cell_mass = (cell_w * cell_h) as f32;

    for gy in 0..GRID_Y {
        for gx in 0..GRID_X {
            let base = (gy * GRID_X + gx) * HIST_BINS;
            for y in gy * cell_h..(gy + 1) * cell_h {
                for x in gx * cell_w..(gx + 1) * cell_w {
                    hist[base + codes[y * cw + x] as usize] += 1.0;
                }
            }
            for bin in &mut hist[base..base + HIST_BINS] {
                *bin /= cell_mass;
            }
        }
    }
    hist
}

/// Chi-square histogram distance: sum((a - b)^2 / a) over bins with mass
/// in `a`. Zero for identical histograms.
fn chi_square(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .filter(|(&x, _)| x > 0.0)
        .map(|(&x, &y)| {
            let d = (x - y) as f64;
            d * d / x as f64
        })
        .sum()
}
