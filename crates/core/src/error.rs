use std::path::PathBuf;

use thiserror::Error;

/// Failures of the frame capture engine. Both load and capture errors abort
/// the current call; nothing is retried.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to load video {source_path}: {reason}")]
    LoadFailed { source_path: PathBuf, reason: String },

    #[error("Failed to capture frame at {timestamp:.2}s: {reason}")]
    CaptureFailed { timestamp: f64, reason: String },

    #[error("No video loaded")]
    NoVideoLoaded,

    #[error("Invalid sampling interval {0}s, expected one of 3, 5 or 10")]
    InvalidInterval(u32),

    #[error("Image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Provider-side failures. Each variant is a distinct, caller-visible cause.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Cannot connect to {endpoint}, make sure the service is running")]
    ConnectionRefused { endpoint: String },

    #[error("Request timed out after {seconds}s, try again later")]
    Timeout { seconds: u64 },

    #[error("API key is invalid or missing, check the configuration")]
    AuthInvalid,

    #[error("Access denied, check API permissions and quota")]
    AccessDenied,

    #[error("API endpoint {endpoint} does not exist, check the URL")]
    EndpointNotFound { endpoint: String },

    #[error("Too many requests or quota exhausted, try again later")]
    RateLimited,

    #[error("Server error ({status}), try again later")]
    ServerError { status: u16 },

    #[error("Malformed response: {reason}")]
    MalformedResponse { reason: String },

    #[error("Unsupported provider kind: {0}")]
    UnknownProviderKind(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid provider configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record {key} not found in {collection}")]
    NotFound { collection: &'static str, key: String },
}

#[derive(Error, Debug)]
pub enum FrameSpeakError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Frame {0} not found")]
    FrameNotFound(String),

    #[error("Frame {0} has no image data")]
    MissingImage(String),
}

pub type Result<T> = std::result::Result<T, FrameSpeakError>;
