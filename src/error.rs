//! Error types for promptreel

use std::time::Duration;

use crate::image_api::ImageApiError;
use thiserror::Error;

/// Result type alias for promptreel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for promptreel operations
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid generation settings
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The image API reported a rate limit
    #[error("Image API quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Any other image API failure, or a response without a URL
    #[error("Failed to generate frame {}: {message}", index + 1)]
    FrameGenerationFailed { index: usize, message: String },

    /// Fetching a generated asset or writing it to the staging area failed
    #[error("Staging failed: {0}")]
    StagingFailed(String),

    /// The encoding engine could not be loaded
    #[error("Failed to initialize encoder: {0}")]
    EngineInitFailed(String),

    /// The encode command failed during execution
    #[error("Failed to generate video: {0}")]
    EncodeFailed(String),

    /// The job was cancelled by the caller
    #[error("Job cancelled")]
    Cancelled,

    /// A queued task ran longer than its allowed time
    #[error("Task timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    /// Whether this error is a rate-limit signal that may be retried
    pub fn is_quota(&self) -> bool {
        matches!(self, Error::QuotaExceeded(_))
    }

    /// Classify the error for presentation
    pub fn code(&self) -> ErrorCode {
        ErrorCode::from(self)
    }

    /// Attach a frame index to an image API failure.
    ///
    /// Quota errors keep their kind so the retry wrapper can still see them.
    pub fn from_image_api(index: usize, err: ImageApiError) -> Self {
        if err.is_quota() {
            Error::QuotaExceeded(err.to_string())
        } else {
            Error::FrameGenerationFailed {
                index,
                message: err.to_string(),
            }
        }
    }
}

/// Coarse failure classification for callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub enum ErrorCode {
    /// Invalid input parameter or configuration
    InvalidInput = 1,
    /// Image API quota exhausted after retries
    QuotaExceeded = 2,
    /// Frame generation failed
    FrameGenerationFailed = 3,
    /// Asset staging failed
    StagingFailed = 4,
    /// Encoder could not be initialized
    EngineInitFailed = 5,
    /// Encoding failed
    EncodeFailed = 6,
    /// Cancelled or timed out
    Aborted = 7,
}

impl From<&Error> for ErrorCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::InvalidInput(_) => ErrorCode::InvalidInput,
            Error::Config(_) => ErrorCode::InvalidInput,
            Error::QuotaExceeded(_) => ErrorCode::QuotaExceeded,
            Error::FrameGenerationFailed { .. } => ErrorCode::FrameGenerationFailed,
            Error::StagingFailed(_) => ErrorCode::StagingFailed,
            Error::Io(_) => ErrorCode::StagingFailed,
            Error::Image(_) => ErrorCode::StagingFailed,
            Error::EngineInitFailed(_) => ErrorCode::EngineInitFailed,
            Error::EncodeFailed(_) => ErrorCode::EncodeFailed,
            Error::Cancelled => ErrorCode::Aborted,
            Error::Timeout(_) => ErrorCode::Aborted,
        }
    }
}
