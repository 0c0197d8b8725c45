//! Frame synthesis: per-frame prompts and sequential image generation

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::image_api::{ImageGenerator, ImageRequest};
use crate::progress::{Phase, ProgressReporter, GENERATING_SHARE};
use crate::queue::RateLimitQueue;
use crate::retry::{with_quota_retry, RetryPolicy};
use crate::settings::GenerationSettings;
use crate::{Error, Result};

/// Phrasings rotated across frames to reduce repetition
pub const PROMPT_MODIFIERS: [&str; 5] = [
    "with a unique perspective",
    "from a different angle",
    "with an alternative approach",
    "with a fresh take",
    "with a distinct style",
];

/// Position of a frame within the clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneLabel {
    Opening,
    Main,
    Closing,
}

impl SceneLabel {
    /// First frame opens, last frame closes; a single frame is an opening
    pub fn for_index(index: usize, frame_count: usize) -> Self {
        if index == 0 {
            SceneLabel::Opening
        } else if index + 1 == frame_count {
            SceneLabel::Closing
        } else {
            SceneLabel::Main
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SceneLabel::Opening => "opening",
            SceneLabel::Main => "main",
            SceneLabel::Closing => "closing",
        }
    }
}

/// Request text for one frame
pub fn frame_prompt(settings: &GenerationSettings, index: usize, frame_count: usize) -> String {
    let modifier = PROMPT_MODIFIERS[index % PROMPT_MODIFIERS.len()];
    let scene = SceneLabel::for_index(index, frame_count);
    format!(
        "{} {} - {} scene - in {} style with {} focus",
        settings.prompt.trim(),
        modifier,
        scene.as_str(),
        settings.style.as_str(),
        settings.category.as_str(),
    )
}

/// All frame prompts, in index order
pub fn frame_prompts(settings: &GenerationSettings) -> Vec<String> {
    let count = settings.frame_count();
    (0..count).map(|i| frame_prompt(settings, i, count)).collect()
}

/// A generated frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFrame {
    pub index: usize,
    pub prompt: String,
    pub url: String,
}

/// Drives the image API through the rate-limited queue
pub struct FrameSynthesizer {
    images: Arc<dyn ImageGenerator>,
    queue: RateLimitQueue,
    retry: RetryPolicy,
}

impl FrameSynthesizer {
    pub fn new(images: Arc<dyn ImageGenerator>, queue: RateLimitQueue, retry: RetryPolicy) -> Self {
        Self {
            images,
            queue,
            retry,
        }
    }

    /// Generate one image per frame, strictly in order.
    ///
    /// The first frame that fails (after quota retries) fails the whole
    /// job; no partial frame list is returned.
    pub async fn synthesize(
        &self,
        settings: &GenerationSettings,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<Vec<GeneratedFrame>> {
        let frame_count = settings.frame_count();
        let mut frames = Vec::with_capacity(frame_count);

        reporter.report(Phase::Generating, 0.0, "Generating frames...");
        tracing::info!(frame_count, "Generating frames");

        for index in 0..frame_count {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let prompt = frame_prompt(settings, index, frame_count);
            let request = ImageRequest::for_settings(prompt.clone(), settings);

            let url = self
                .generate_frame(index, request, cancel)
                .await
                .inspect_err(|e| {
                    tracing::error!(frame = index + 1, frame_count, error = %e, "Frame generation failed");
                })?;

            tracing::debug!(frame = index + 1, frame_count, url = %url, "Frame generated");
            frames.push(GeneratedFrame { index, prompt, url });

            reporter.report(
                Phase::Generating,
                (index + 1) as f64 / frame_count as f64 * GENERATING_SHARE,
                format!("Generated frame {}/{}", index + 1, frame_count),
            );
        }

        Ok(frames)
    }

    async fn generate_frame(
        &self,
        index: usize,
        request: ImageRequest,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let request = Arc::new(request);
        let queue = &self.queue;
        let images = &self.images;

        with_quota_retry(&self.retry, cancel, move || {
            let images = images.clone();
            let request = request.clone();
            queue.enqueue_with_cancel(cancel, move || async move {
                images
                    .generate(&request)
                    .await
                    .map_err(|e| Error::from_image_api(index, e))
            })
        })
        .await
        .map_err(|e| match e {
            // Stays a quota error; the message names the frame that hit it.
            Error::QuotaExceeded(message) => {
                Error::QuotaExceeded(format!("frame {}: {message}", index + 1))
            }
            other => other,
        })
    }
}
