use anyhow::Result;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

mod config;
mod dataset;
mod dbus_interface;
mod engine;
mod error;
mod labels;
mod store;
mod trainer;

use config::Config;
use dbus_interface::{FaceService, BUS_NAME, OBJECT_PATH};
use labels::LabelStore;
use trainer::Trainer;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facekeepd starting");

    let config = Arc::new(Config::from_env());
    std::fs::create_dir_all(config.dataset_dir())?;
    std::fs::create_dir_all(config.model_dir())?;
    tracing::info!(
        data_dir = %config.data_dir.display(),
        detector_model = %config.detector_model.display(),
        threshold = config.default_threshold,
        "configuration loaded"
    );

    let labels = Arc::new(Mutex::new(LabelStore::open(config.labels_path())?));
    let trainer = Trainer::new(config.clone(), labels.clone());
    let engine = engine::spawn_engine(config.clone(), labels.clone(), trainer.clone());

    let service = FaceService::new(config, labels, trainer, engine);
    let _connection = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await?;

    tracing::info!(bus = BUS_NAME, "facekeepd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("facekeepd shutting down");

    Ok(())
}
