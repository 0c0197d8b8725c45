//! Video generation entry point
//!
//! One job runs its phases strictly in order: frame synthesis, staging,
//! encoding, publication. Each job gets its own staging area, which is
//! removed when the job ends whether it succeeded or not. The request
//! queue and the encoding engine are shared by every job of a generator.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::blob::BlobRegistry;
use crate::command::{EncodeCommand, WATERMARK_INPUT_FILE};
use crate::config::PipelineConfig;
use crate::engine::{EncodeRunner, EncodedVideo, EngineHandle, EngineLoader, FfmpegLoader};
use crate::image_api::{ImageGenerator, OpenAiImages};
use crate::probe::{inspect_mp4, ContainerInfo};
use crate::progress::{Phase, ProgressObserver, ProgressReporter, ENCODING_START};
use crate::queue::{RateLimitConfig, RateLimitQueue};
use crate::retry::RetryPolicy;
use crate::settings::GenerationSettings;
use crate::staging::{self, AssetFetcher, HttpFetcher, StagingArea};
use crate::synth::FrameSynthesizer;
use crate::{Error, Result, FPS};

/// MIME type of every produced video
pub const VIDEO_MIME: &str = "video/mp4";

/// A finished video, published as an object URL
#[derive(Debug, Clone)]
pub struct VideoAsset {
    /// Object URL resolvable through [`VideoGenerator::blobs`]
    pub url: String,
    pub mime: String,
    pub size_bytes: usize,
    pub frame_count: usize,
    pub width: u32,
    pub height: u32,
    /// Header summary, when the output could be parsed
    pub info: Option<ContainerInfo>,
}

/// Builder for [`VideoGenerator`]
pub struct VideoGeneratorBuilder {
    images: Arc<dyn ImageGenerator>,
    fetcher: Option<Arc<dyn AssetFetcher>>,
    engine: Option<Arc<EngineHandle>>,
    rate_limit: RateLimitConfig,
    retry: RetryPolicy,
    observers: Vec<Arc<dyn ProgressObserver>>,
    staging_root: Option<PathBuf>,
    blobs: Option<Arc<BlobRegistry>>,
}

impl VideoGeneratorBuilder {
    pub fn fetcher(mut self, fetcher: impl AssetFetcher + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Load the engine through `loader` on first use
    pub fn engine_loader(mut self, loader: impl EngineLoader + 'static) -> Self {
        self.engine = Some(Arc::new(EngineHandle::new(loader)));
        self
    }

    /// Share an engine handle with other generators
    pub fn engine(mut self, handle: Arc<EngineHandle>) -> Self {
        self.engine = Some(handle);
        self
    }

    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Create staging areas under `root` instead of the system temp dir
    pub fn staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    pub fn blobs(mut self, registry: Arc<BlobRegistry>) -> Self {
        self.blobs = Some(registry);
        self
    }

    /// Build the generator. Spawns the queue worker, so this must run
    /// inside a Tokio runtime.
    pub fn build(self) -> VideoGenerator {
        let queue = RateLimitQueue::new(self.rate_limit);
        let engine = self
            .engine
            .unwrap_or_else(|| Arc::new(EngineHandle::new(FfmpegLoader::default())));

        VideoGenerator {
            synthesizer: FrameSynthesizer::new(self.images, queue, self.retry),
            fetcher: self
                .fetcher
                .unwrap_or_else(|| Arc::new(HttpFetcher::new())),
            runner: EncodeRunner::new(engine),
            observers: self.observers,
            staging_root: self.staging_root,
            blobs: self.blobs.unwrap_or_default(),
        }
    }
}

/// Turns a prompt and settings into a finished MP4
pub struct VideoGenerator {
    synthesizer: FrameSynthesizer,
    fetcher: Arc<dyn AssetFetcher>,
    runner: EncodeRunner,
    observers: Vec<Arc<dyn ProgressObserver>>,
    staging_root: Option<PathBuf>,
    blobs: Arc<BlobRegistry>,
}

impl VideoGenerator {
    pub fn builder(images: Arc<dyn ImageGenerator>) -> VideoGeneratorBuilder {
        VideoGeneratorBuilder {
            images,
            fetcher: None,
            engine: None,
            rate_limit: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
            observers: Vec::new(),
            staging_root: None,
            blobs: None,
        }
    }

    /// OpenAI images, HTTP fetching and a local ffmpeg, as configured
    pub fn from_config(config: &PipelineConfig) -> VideoGeneratorBuilder {
        let images = OpenAiImages::with_client(
            reqwest::Client::new(),
            &config.image_api_url,
            &config.api_key,
        )
        .model(&config.image_model);

        let mut builder = Self::builder(Arc::new(images))
            .engine_loader(FfmpegLoader::new(config.ffmpeg_path.clone()))
            .rate_limit(config.rate_limit.clone());
        if let Some(root) = &config.staging_dir {
            builder = builder.staging_root(root.clone());
        }
        builder
    }

    /// Registry holding the produced videos
    pub fn blobs(&self) -> &Arc<BlobRegistry> {
        &self.blobs
    }

    pub async fn generate(&self, settings: &GenerationSettings) -> Result<VideoAsset> {
        self.generate_with_cancel(settings, &CancellationToken::new())
            .await
    }

    /// Run one generation job.
    ///
    /// Any failure aborts the job; nothing is published and the staging
    /// area is removed.
    pub async fn generate_with_cancel(
        &self,
        settings: &GenerationSettings,
        cancel: &CancellationToken,
    ) -> Result<VideoAsset> {
        settings.validate()?;
        let dims = settings.resolution();
        tracing::info!(
            frames = settings.frame_count(),
            width = dims.width,
            height = dims.height,
            style = settings.style.as_str(),
            "Starting video generation",
        );

        let reporter = ProgressReporter::new(self.observers.clone());

        let frames = self
            .synthesizer
            .synthesize(settings, &reporter, cancel)
            .await?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut area = self.staging_area()?;
        let staged = staging::stage(
            &mut area,
            self.fetcher.as_ref(),
            &frames,
            settings.audio.as_ref(),
            settings.active_logo(),
            &reporter,
        )
        .await?;

        let command = EncodeCommand::build(settings, &staged);
        reporter.report(Phase::Processing, ENCODING_START, "Encoding video...");
        let encoded = self
            .runner
            .run(&area, &command, cancel)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Encoding failed"))?;
        drop(area);

        let asset = self.publish(encoded, frames.len(), dims.width, dims.height);
        reporter.report(Phase::Complete, 100.0, "Video generated successfully!");
        tracing::info!(url = %asset.url, size = asset.size_bytes, "Video generated");
        Ok(asset)
    }

    /// Burn a text watermark into an existing video.
    ///
    /// `video_url` is either an object URL from [`Self::blobs`] or a URL
    /// the fetcher can retrieve. The source URL stays valid.
    pub async fn add_watermark(&self, video_url: &str, text: &str) -> Result<VideoAsset> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Watermark text must not be empty".to_string(),
            ));
        }

        let source = match self.blobs.resolve(video_url) {
            Some(blob) => blob.data.clone(),
            None => self.fetcher.fetch(video_url).await?,
        };
        let source_info = inspect_mp4(&source).ok();

        let mut area = self.staging_area()?;
        area.write(WATERMARK_INPUT_FILE, &source).await?;

        let command = EncodeCommand::watermark(WATERMARK_INPUT_FILE, text);
        let encoded = self
            .runner
            .run(&area, &command, &CancellationToken::new())
            .await?;
        drop(area);

        let info = encoded.info.clone().or(source_info);
        let (width, height) = info
            .as_ref()
            .map_or((0, 0), |i| (u32::from(i.width), u32::from(i.height)));
        let frame_count = info
            .as_ref()
            .map_or(0, |i| (i.duration.as_secs_f64() * FPS as f64).round() as usize);

        let asset = self.publish(encoded, frame_count, width, height);
        tracing::info!(url = %asset.url, source = %video_url, "Watermark added");
        Ok(asset)
    }

    fn staging_area(&self) -> Result<StagingArea> {
        match &self.staging_root {
            Some(root) => StagingArea::new_in(root),
            None => StagingArea::new(),
        }
    }

    fn publish(
        &self,
        encoded: EncodedVideo,
        frame_count: usize,
        width: u32,
        height: u32,
    ) -> VideoAsset {
        let size_bytes = encoded.bytes.len();
        let url = self.blobs.create_object_url(encoded.bytes, VIDEO_MIME);
        VideoAsset {
            url,
            mime: VIDEO_MIME.to_string(),
            size_bytes,
            frame_count,
            width,
            height,
            info: encoded.info,
        }
    }
}
