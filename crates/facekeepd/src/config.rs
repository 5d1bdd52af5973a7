use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Root of all persisted state (dataset + model directory).
    pub data_dir: PathBuf,
    /// Path to the SeetaFace frontal detector model file.
    pub detector_model: PathBuf,
    /// Default recognition distance threshold; predictions farther than
    /// this are reported as unknown.
    pub default_threshold: f64,
}

impl Config {
    /// Load configuration from `FACEKEEP_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("FACEKEEP_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::var("XDG_DATA_HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| {
                        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                        PathBuf::from(home).join(".local/share")
                    })
                    .join("facekeep")
            });

        let detector_model = std::env::var("FACEKEEP_DETECTOR_MODEL")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("models").join("seeta_fd_frontal_v1.0.bin"));

        Self {
            data_dir,
            detector_model,
            default_threshold: env_f64("FACEKEEP_THRESHOLD", 80.0),
        }
    }

    /// Directory holding one subdirectory of samples per identity.
    pub fn dataset_dir(&self) -> PathBuf {
        self.data_dir.join("dataset")
    }

    /// Directory holding the label registry and model artifact.
    pub fn model_dir(&self) -> PathBuf {
        self.data_dir.join("model")
    }

    /// Path of the persisted label registry.
    pub fn labels_path(&self) -> PathBuf {
        self.model_dir().join("labels.json")
    }

    /// Canonical path of the published model artifact.
    pub fn artifact_path(&self) -> PathBuf {
        self.model_dir().join("trainer.json")
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
