use facekeep_core::{DetectorError, RecognizerError};
use thiserror::Error;

/// Request-scoped failures surfaced to callers.
///
/// Background auto-retrain swallows these (logged only); every other path
/// propagates them to the transport layer, which maps each variant to a
/// specific D-Bus error and keeps internal detail out of unclassified
/// failures.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Detector model unavailable. Fatal to detection-dependent calls,
    /// never to the process.
    #[error("detector unavailable: {0}")]
    Configuration(#[from] DetectorError),
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("no training samples available")]
    InsufficientData,
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Fold image-codec failures into the taxonomy: encoder/decoder I/O maps
/// to `Io`, everything else is opaque to callers.
pub fn image_write_error(err: image::ImageError) -> ServiceError {
    match err {
        image::ImageError::IoError(e) => ServiceError::Io(e),
        other => ServiceError::Io(std::io::Error::other(other)),
    }
}
