use thiserror::Error;

/// Errors raised by the capture pipeline.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no video input detected: none of the {views} view(s) produced any frames")]
    NoInput { views: usize },

    #[error("invalid view '{label}': {reason}")]
    InvalidView { label: String, reason: String },

    #[error("invalid capture request: {0}")]
    InvalidRequest(String),

    #[error("seek to {time:.3}s did not complete within {timeout_ms}ms")]
    SeekTimeout { time: f64, timeout_ms: u64 },

    #[error("seek to {time:.3}s failed: {message}")]
    Seek { time: f64, message: String },

    #[error("failed to render frame: {0}")]
    Render(String),

    #[error("failed to load frame {path}: {source}")]
    Load {
        path: String,
        source: image::ImageError,
    },

    #[error("failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),

    #[error("pose detection failed: {0:#}")]
    Detection(anyhow::Error),

    #[error("blocking task failed: {0}")]
    Blocking(String),

    #[error("scan cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the external movement-analysis service.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Transport(String),

    #[error("oracle response is not valid feedback JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("oracle rejected the request: {0}")]
    Rejected(String),
}

/// Capture or oracle failure, kept apart so callers can tell them apart.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Oracle(#[from] OracleError),
}

pub type Result<T> = std::result::Result<T, CaptureError>;
