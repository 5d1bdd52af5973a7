//! Model trainer — synchronous retrain plus a guarded background mode.
//!
//! Background retrains are single-flight: scheduling while a run is in
//! progress marks the dataset dirty instead of spawning a second trainer,
//! and the finishing run immediately makes one more pass. The in-progress
//! state is observable for diagnostics.

use crate::config::Config;
use crate::dataset;
use crate::error::ServiceError;
use crate::labels::LabelStore;
use facekeep_core::LbphModel;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct FlightState {
    in_flight: bool,
    rerun: bool,
}

struct TrainerInner {
    config: Arc<Config>,
    labels: Arc<Mutex<LabelStore>>,
    runtime: tokio::runtime::Handle,
    flight: Mutex<FlightState>,
    /// Signaled whenever `in_flight` drops; manual retrains wait on it.
    idle: Condvar,
}

/// Clone-safe handle to the trainer.
#[derive(Clone)]
pub struct Trainer {
    inner: Arc<TrainerInner>,
}

impl Trainer {
    /// Must be constructed inside the tokio runtime; background runs are
    /// dispatched onto its blocking pool.
    pub fn new(config: Arc<Config>, labels: Arc<Mutex<LabelStore>>) -> Self {
        Self {
            inner: Arc::new(TrainerInner {
                config,
                labels,
                runtime: tokio::runtime::Handle::current(),
                flight: Mutex::new(FlightState::default()),
                idle: Condvar::new(),
            }),
        }
    }

    /// Synchronous full retrain. Blocking; returns the number of training
    /// examples.
    ///
    /// Takes the same flight guard as background runs: at most one trainer
    /// writes the artifact at any moment, so two publishers can never share
    /// the temp file. A manual retrain waits for an in-flight run to drain
    /// rather than racing it.
    ///
    /// Fails with `InsufficientData` when the dataset is empty — distinct
    /// from a successful train of nothing, the artifact stays untouched.
    pub fn train_now(&self) -> Result<usize, ServiceError> {
        let mut flight = self.lock_flight();
        while flight.in_flight {
            flight = self
                .inner
                .idle
                .wait(flight)
                .unwrap_or_else(PoisonError::into_inner);
        }
        flight.in_flight = true;
        drop(flight);

        let result = self.run_training();

        let rerun = {
            let mut flight = self.lock_flight();
            flight.in_flight = false;
            std::mem::take(&mut flight.rerun)
        };
        self.inner.idle.notify_all();
        if rerun {
            // A registration landed mid-run; its retrain is still owed.
            self.schedule();
        }
        result
    }

    /// Build the training set, fit the recognizer and atomically publish
    /// the artifact. Callers hold the flight guard.
    fn run_training(&self) -> Result<usize, ServiceError> {
        let set = dataset::build(&self.inner.config.dataset_dir(), &self.inner.labels)?;
        if set.is_empty() {
            return Err(ServiceError::InsufficientData);
        }

        let model = LbphModel::train(&set.images, &set.ids)?;
        model.save(&self.inner.config.artifact_path())?;
        tracing::info!(samples = set.len(), "model artifact published");
        Ok(set.len())
    }

    /// Fire-and-forget retrain, triggered after each successful
    /// registration. Failures (including no-data) are logged and
    /// swallowed — the registration already succeeded and no caller waits.
    pub fn schedule(&self) {
        {
            let mut flight = self.lock_flight();
            if flight.in_flight {
                flight.rerun = true;
                tracing::debug!("retrain already in flight; queued a follow-up pass");
                return;
            }
            flight.in_flight = true;
        }

        let trainer = self.clone();
        self.inner
            .runtime
            .spawn_blocking(move || trainer.run_background());
    }

    /// Whether any retrain — background or manual — is currently running.
    pub fn is_training(&self) -> bool {
        self.lock_flight().in_flight
    }

    fn run_background(&self) {
        loop {
            match self.run_training() {
                Ok(samples) => tracing::info!(samples, "background retrain complete"),
                Err(ServiceError::InsufficientData) => {
                    tracing::debug!("background retrain skipped: no training samples")
                }
                Err(e) => tracing::warn!(error = %e, "background retrain failed"),
            }

            let mut flight = self.lock_flight();
            if flight.rerun {
                // The dataset changed while we trained; the model just
                // published is already stale. Go again.
                flight.rerun = false;
                continue;
            }
            flight.in_flight = false;
            drop(flight);
            self.inner.idle.notify_all();
            return;
        }
    }

    fn lock_flight(&self) -> MutexGuard<'_, FlightState> {
        self.inner
            .flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
