//! D-Bus interface for the Facekeep daemon.
//!
//! Bus name: org.facekeep.Face1
//! Object path: /org/facekeep/Face1
//!
//! Thin mapping layer: replies are JSON strings, errors map onto the
//! fixed taxonomy with stable messages — unclassified internal failures
//! never leak paths or state to callers.

use crate::config::Config;
use crate::engine::EngineHandle;
use crate::error::ServiceError;
use crate::labels::{lock_store, LabelStore};
use crate::trainer::Trainer;
use std::sync::{Arc, Mutex};
use zbus::fdo;
use zbus::interface;

pub const BUS_NAME: &str = "org.facekeep.Face1";
pub const OBJECT_PATH: &str = "/org/facekeep/Face1";

pub struct FaceService {
    config: Arc<Config>,
    labels: Arc<Mutex<LabelStore>>,
    trainer: Trainer,
    engine: EngineHandle,
}

impl FaceService {
    pub fn new(
        config: Arc<Config>,
        labels: Arc<Mutex<LabelStore>>,
        trainer: Trainer,
        engine: EngineHandle,
    ) -> Self {
        Self {
            config,
            labels,
            trainer,
            engine,
        }
    }
}

#[interface(name = "org.facekeep.Face1")]
impl FaceService {
    /// List known identity names.
    async fn people(&self) -> fdo::Result<String> {
        let names = lock_store(&self.labels).names();
        Ok(serde_json::json!({ "people": names }).to_string())
    }

    /// Register one or many encoded images as samples for `name`.
    /// Triggers an asynchronous retrain; returns the saved sample paths.
    async fn register(&self, name: &str, images: Vec<Vec<u8>>) -> fdo::Result<String> {
        if name.trim().is_empty() {
            return Err(fdo::Error::InvalidArgs("name must not be empty".into()));
        }
        tracing::info!(name, images = images.len(), "register requested");

        let saved = self
            .engine
            .register(name.to_string(), images)
            .await
            .map_err(to_fdo)?;

        let paths: Vec<String> = saved
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        Ok(serde_json::json!({ "ok": true, "saved": paths }).to_string())
    }

    /// Recognize faces in one encoded image. A non-positive `threshold`
    /// selects the configured default (D-Bus has no optional arguments).
    async fn recognize(&self, image: Vec<u8>, threshold: f64) -> fdo::Result<String> {
        let threshold = (threshold > 0.0).then_some(threshold);
        let reply = self
            .engine
            .recognize(image, threshold)
            .await
            .map_err(to_fdo)?;

        serde_json::to_string(&serde_json::json!({
            "ok": true,
            "result": reply.result,
            "threshold": reply.threshold,
        }))
        .map_err(|e| fdo::Error::Failed(e.to_string()))
    }

    /// Force a synchronous full retrain; returns the number of training
    /// examples used.
    async fn train(&self) -> fdo::Result<u64> {
        tracing::info!("synchronous retrain requested");
        let trainer = self.trainer.clone();
        let count = tokio::task::spawn_blocking(move || trainer.train_now())
            .await
            .map_err(|_| fdo::Error::Failed("training task aborted".into()))?
            .map_err(to_fdo)?;
        Ok(count as u64)
    }

    /// Daemon status for diagnostics.
    async fn status(&self) -> fdo::Result<String> {
        let people = lock_store(&self.labels).len();
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "people": people,
            "training": self.trainer.is_training(),
            "model_trained": self.config.artifact_path().exists(),
        })
        .to_string())
    }
}

/// Map the error taxonomy onto D-Bus errors. Each classified failure gets
/// a specific error with an actionable message; internal failures stay
/// generic.
fn to_fdo(err: ServiceError) -> fdo::Error {
    match &err {
        ServiceError::Configuration(_) => {
            fdo::Error::Failed("face detector model is not installed".into())
        }
        ServiceError::InvalidImage(_) | ServiceError::NoFaceDetected => {
            fdo::Error::InvalidArgs(err.to_string())
        }
        ServiceError::InsufficientData => fdo::Error::InvalidArgs(err.to_string()),
        ServiceError::Io(_) => fdo::Error::IOError("storage operation failed".into()),
        ServiceError::Recognizer(_) | ServiceError::ChannelClosed => {
            tracing::error!(error = %err, "internal failure");
            fdo::Error::Failed("internal error".into())
        }
    }
}
