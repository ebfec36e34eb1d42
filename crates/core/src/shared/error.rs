use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::inference::domain::inference_model::{Device, ModelKind};

/// A model artifact could not be loaded or bound to its device.
///
/// Fatal to the worker that hit it: the same slot will keep failing until the
/// artifact or device is fixed.
#[derive(Error, Debug, Clone)]
pub enum ResourceLoadError {
    #[error("model artifact for {kind} is unreadable at {path}: {message}")]
    ArtifactUnreadable {
        kind: ModelKind,
        path: PathBuf,
        message: String,
    },
    #[error("failed to bind {kind} model to {device}: {message}")]
    DeviceBinding {
        kind: ModelKind,
        device: Device,
        message: String,
    },
}

#[derive(Error, Debug, Clone)]
pub enum ImageReadError {
    #[error("image not found: {0}")]
    NotFound(String),
    #[error("failed to decode image {locator}: {message}")]
    Decode { locator: String, message: String },
}

/// Malformed input shape (mask/image mismatch, degenerate polygon, ...).
#[derive(Error, Debug, Clone, PartialEq)]
#[error("validation failed: {0}")]
pub struct ValidationError(pub String);

#[derive(Error, Debug, Clone)]
pub enum InferenceError {
    #[error("inference runtime error: {0}")]
    Runtime(String),
    #[error("unexpected model output: {0}")]
    UnexpectedOutput(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("circuit breaker is open; retry after {retry_after:?}")]
pub struct CircuitBreakerOpenError {
    pub retry_after: Duration,
}

/// Failure of a single stage call (segment, detect, estimate).
#[derive(Error, Debug, Clone)]
pub enum StageError {
    #[error(transparent)]
    ResourceLoad(#[from] ResourceLoadError),
    #[error(transparent)]
    ImageRead(#[from] ImageReadError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Outcome classification for a failed unit of work, as seen by the retry policy.
#[derive(Error, Debug, Clone)]
pub enum UnitError {
    /// The input image does not exist; retrying cannot help.
    #[error("missing input: {0}")]
    MissingInput(String),
    /// The worker slot cannot load or bind its models; fatal to that slot.
    #[error("worker resource failure: {0}")]
    ResourceLoad(#[source] ResourceLoadError),
    #[error("transient processing error: {0}")]
    TransientProcessing(String),
}

impl UnitError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, UnitError::MissingInput(_) | UnitError::ResourceLoad(_))
    }
}

impl From<StageError> for UnitError {
    fn from(err: StageError) -> Self {
        match err {
            StageError::ImageRead(ImageReadError::NotFound(locator)) => {
                UnitError::MissingInput(locator)
            }
            StageError::ResourceLoad(e) => UnitError::ResourceLoad(e),
            other => UnitError::TransientProcessing(other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to serialize job record: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to write job record to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not determine model directory")]
    NoModelDir,
}
