//! Service engine — owns the detector on a dedicated thread and serves
//! the detection-dependent operations (register, recognize).
//!
//! Requests arrive over an mpsc channel with oneshot replies. The detector
//! is opened lazily on first use, so a missing model file fails individual
//! requests instead of daemon startup. Registrations are processed one at
//! a time by this loop, which serializes sample-index probing and registry
//! updates per identity.

use crate::config::Config;
use crate::error::ServiceError;
use crate::labels::{lock_store, LabelStore};
use crate::store;
use crate::trainer::Trainer;
use facekeep_core::{FaceBox, FaceDetector, LbphModel, SAMPLE_SIZE};
use image::imageops::{self, FilterType};
use image::GrayImage;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

/// Name reported for a face the model cannot claim.
pub const UNKNOWN_NAME: &str = "unknown";

/// Per-box recognition result.
#[derive(Debug, Clone, Serialize)]
pub struct Recognition {
    pub rect: [u32; 4],
    pub name: String,
    /// Nearest-neighbor distance (lower = more similar); absent before the
    /// first model has been trained.
    pub confidence: Option<f64>,
}

/// Full recognition reply, including the threshold actually applied.
#[derive(Debug, Serialize)]
pub struct RecognizeReply {
    pub result: Vec<Recognition>,
    pub threshold: f64,
}

/// Messages sent from transport handlers to the engine thread.
enum EngineRequest {
    Register {
        name: String,
        images: Vec<Vec<u8>>,
        reply: oneshot::Sender<Result<Vec<PathBuf>, ServiceError>>,
    },
    Recognize {
        image: Vec<u8>,
        threshold: Option<f64>,
        reply: oneshot::Sender<Result<RecognizeReply, ServiceError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Register one or many samples for an identity; returns saved paths.
    pub async fn register(
        &self,
        name: String,
        images: Vec<Vec<u8>>,
    ) -> Result<Vec<PathBuf>, ServiceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Register {
                name,
                images,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ServiceError::ChannelClosed)?;
        reply_rx.await.map_err(|_| ServiceError::ChannelClosed)?
    }

    /// Recognize faces in one image against the current model.
    pub async fn recognize(
        &self,
        image: Vec<u8>,
        threshold: Option<f64>,
    ) -> Result<RecognizeReply, ServiceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Recognize {
                image,
                threshold,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ServiceError::ChannelClosed)?;
        reply_rx.await.map_err(|_| ServiceError::ChannelClosed)?
    }
}

struct EngineState {
    config: Arc<Config>,
    labels: Arc<Mutex<LabelStore>>,
    trainer: Trainer,
    /// Opened on first detection-dependent request.
    detector: Option<FaceDetector>,
}

/// Spawn the engine on a dedicated OS thread.
///
/// The detector is not opened here: per the lazy-check contract, a missing
/// detector model must surface per request, not at startup.
pub fn spawn_engine(
    config: Arc<Config>,
    labels: Arc<Mutex<LabelStore>>,
    trainer: Trainer,
) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(8);

    std::thread::Builder::new()
        .name("facekeep-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            let mut state = EngineState {
                config,
                labels,
                trainer,
                detector: None,
            };
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Register {
                        name,
                        images,
                        reply,
                    } => {
                        let _ = reply.send(run_register(&mut state, &name, &images));
                    }
                    EngineRequest::Recognize {
                        image,
                        threshold,
                        reply,
                    } => {
                        let _ = reply.send(run_recognize(&mut state, &image, threshold));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}

impl EngineState {
    fn detector(&mut self) -> Result<&mut FaceDetector, ServiceError> {
        match &mut self.detector {
            Some(d) => Ok(d),
            slot @ None => {
                let detector = FaceDetector::open(&self.config.detector_model)?;
                Ok(slot.insert(detector))
            }
        }
    }
}

/// Decode a transmitted image and reduce it to the grayscale plane all
/// further processing operates on.
fn decode_gray(bytes: &[u8]) -> Result<GrayImage, ServiceError> {
    if bytes.is_empty() {
        return Err(ServiceError::InvalidImage("empty image payload".into()));
    }
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| ServiceError::InvalidImage(e.to_string()))?;
    Ok(decoded.to_luma8())
}

/// Crop a detected box (clamped to the frame) and normalize it to the
/// fixed sample size the recognizer expects.
fn crop_face(gray: &GrayImage, face: &FaceBox) -> GrayImage {
    let (w, h) = gray.dimensions();
    let x = face.x.min(w.saturating_sub(1));
    let y = face.y.min(h.saturating_sub(1));
    let cw = face.width.min(w - x).max(1);
    let ch = face.height.min(h - y).max(1);

    let crop = imageops::crop_imm(gray, x, y, cw, ch).to_image();
    imageops::resize(&crop, SAMPLE_SIZE, SAMPLE_SIZE, FilterType::Triangle)
}

/// Apply the distance threshold: strictly greater than the threshold means
/// unknown, equality stays with the predicted identity.
fn classify(name: Option<&str>, distance: f64, threshold: f64) -> String {
    match name {
        Some(n) if distance <= threshold => n.to_string(),
        _ => UNKNOWN_NAME.to_string(),
    }
}

/// Result for a face no model can speak for: before the first training run
/// every detected face is reported unknown with no distance. A valid
/// state, not an error.
fn unrecognized(face: &FaceBox) -> Recognition {
    Recognition {
        rect: face.rect(),
        name: UNKNOWN_NAME.to_string(),
        confidence: None,
    }
}

fn run_register(
    state: &mut EngineState,
    name: &str,
    images: &[Vec<u8>],
) -> Result<Vec<PathBuf>, ServiceError> {
    if images.is_empty() {
        return Err(ServiceError::InvalidImage("no images supplied".into()));
    }

    let slug = store::sanitize_name(name);
    if lock_store(&state.labels).note_alias(&slug, name) {
        tracing::warn!(
            raw = name,
            slug,
            "distinct raw names map to one identity after sanitization; merging samples"
        );
    }

    let mut saved = Vec::with_capacity(images.len());
    for bytes in images {
        let gray = decode_gray(bytes)?;
        let boxes = state.detector()?.detect(&gray);
        let Some(largest) = boxes.iter().max_by_key(|b| b.area()) else {
            return Err(ServiceError::NoFaceDetected);
        };

        let face = crop_face(&gray, largest);
        saved.push(store::save_sample(&state.config.dataset_dir(), &slug, &face)?);
    }

    // Sample writes succeeded; only now touch the registry, so a failed
    // write can never leave a ghost identity.
    lock_store(&state.labels).get_or_create(&slug)?;

    state.trainer.schedule();
    tracing::info!(slug, samples = saved.len(), "registration complete");
    Ok(saved)
}

fn run_recognize(
    state: &mut EngineState,
    image: &[u8],
    threshold: Option<f64>,
) -> Result<RecognizeReply, ServiceError> {
    let effective = threshold.unwrap_or(state.config.default_threshold);

    let gray = decode_gray(image)?;
    let boxes = state.detector()?.detect(&gray);
    if boxes.is_empty() {
        return Ok(RecognizeReply {
            result: Vec::new(),
            threshold: effective,
        });
    }

    // One artifact load per request; the atomic-rename publication makes
    // this safe against an in-flight background retrain.
    let model = LbphModel::load(&state.config.artifact_path())?;

    let mut result = Vec::with_capacity(boxes.len());
    {
        let labels = lock_store(&state.labels);
        for b in &boxes {
            let recognition = match &model {
                // Cold start: nothing trained yet, every face is unknown.
                None => unrecognized(b),
                Some(m) => {
                    let face = crop_face(&gray, b);
                    match m.predict(&face) {
                        Some(p) => Recognition {
                            rect: b.rect(),
                            name: classify(labels.name_for(p.label), p.distance, effective),
                            confidence: Some(p.distance),
                        },
                        None => unrecognized(b),
                    }
                }
            };
            result.push(recognition);
        }
    }

    Ok(RecognizeReply {
        result,
        threshold: effective,
    })
}
