//! Image generation collaborator
//!
//! The pipeline only needs "submit prompt, receive URL". [`ImageGenerator`]
//! is that seam; [`OpenAiImages`] is the HTTP implementation.

mod openai;

pub use openai::{OpenAiImages, DEFAULT_API_URL, DEFAULT_MODEL};

use async_trait::async_trait;

use crate::settings::{Dimensions, GenerationSettings};

/// Error code the image API uses for rate limiting
pub const RATE_LIMIT_CODE: &str = "rate_limit_exceeded";

/// Image sizes accepted by the generation endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiImageSize {
    Square,
    Landscape,
    Portrait,
}

impl ApiImageSize {
    /// Closest supported size for a target aspect ratio
    pub fn for_dimensions(dims: Dimensions) -> Self {
        if dims.width > dims.height {
            ApiImageSize::Landscape
        } else if dims.height > dims.width {
            ApiImageSize::Portrait
        } else {
            ApiImageSize::Square
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiImageSize::Square => "1024x1024",
            ApiImageSize::Landscape => "1792x1024",
            ApiImageSize::Portrait => "1024x1792",
        }
    }
}

/// Rendering quality requested from the API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageQuality {
    Standard,
    Hd,
}

impl ImageQuality {
    /// Any non-zero creativity asks for HD output
    pub fn from_creativity(creativity: f64) -> Self {
        if creativity > 0.0 {
            ImageQuality::Hd
        } else {
            ImageQuality::Standard
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageQuality::Standard => "standard",
            ImageQuality::Hd => "hd",
        }
    }
}

/// One image generation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub prompt: String,
    pub size: ApiImageSize,
    pub quality: ImageQuality,
}

impl ImageRequest {
    pub fn for_settings(prompt: String, settings: &GenerationSettings) -> Self {
        Self {
            prompt,
            size: ApiImageSize::for_dimensions(settings.resolution()),
            quality: ImageQuality::from_creativity(settings.creativity),
        }
    }
}

/// Errors from the image API layer.
#[derive(Debug, thiserror::Error)]
pub enum ImageApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API returned a non-2xx status code.
    #[error("Image API error ({status}): {message}")]
    Api {
        status: u16,
        /// Machine-readable error code, e.g. `rate_limit_exceeded`.
        code: Option<String>,
        message: String,
    },

    /// The response carried no image URL.
    #[error("Image API response did not contain an image URL")]
    MissingUrl,
}

impl ImageApiError {
    /// Whether the API is signalling a rate limit
    pub fn is_quota(&self) -> bool {
        match self {
            ImageApiError::Api { status, code, .. } => {
                *status == 429 || code.as_deref() == Some(RATE_LIMIT_CODE)
            }
            _ => false,
        }
    }
}

/// Text-to-image service returning one URL per call
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, request: &ImageRequest) -> Result<String, ImageApiError>;
}
