//! Common test utilities

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{ImageBuffer, Rgba, RgbaImage};
use promptreel::engine::{Engine, EngineLoader};
use promptreel::image_api::{ImageApiError, ImageGenerator, ImageRequest, RATE_LIMIT_CODE};
use promptreel::progress::{ProgressEvent, ProgressObserver};
use promptreel::staging::AssetFetcher;
use promptreel::{Error, Result};
use tokio_util::sync::CancellationToken;

/// Generate a test image with a solid color and a subtle gradient
pub fn generate_test_image(width: u32, height: u32, base_color: [u8; 4]) -> RgbaImage {
    let mut img = ImageBuffer::new(width, height);

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let r = base_color[0].saturating_add((x % 50) as u8);
        let g = base_color[1].saturating_add((y % 50) as u8);
        *pixel = Rgba([r, g, base_color[2], base_color[3]]);
    }

    img
}

/// Generate a numbered test image so consecutive frames differ
pub fn generate_numbered_image(width: u32, height: u32, number: u32) -> RgbaImage {
    let colors = [
        [255, 100, 100, 255],
        [100, 255, 100, 255],
        [100, 100, 255, 255],
        [255, 255, 100, 255],
        [255, 100, 255, 255],
        [100, 255, 255, 255],
    ];

    let color = colors[(number as usize) % colors.len()];
    generate_test_image(width, height, color)
}

/// Encode a test image as JPEG bytes
pub fn jpeg_bytes(img: &RgbaImage, quality: u8) -> Vec<u8> {
    let rgb_img = image::DynamicImage::ImageRgba8(img.clone()).to_rgb8();
    let mut out = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
    encoder.encode_image(&rgb_img).unwrap();
    out
}

/// Encode a test image as PNG bytes
pub fn png_bytes(img: &RgbaImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Check if ffmpeg is available
pub fn ffmpeg_available() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Image generator returning predictable URLs and recording every prompt
#[derive(Default)]
pub struct MockImages {
    prompts: Mutex<Vec<String>>,
    /// 1-based request number that fails with a non-quota error
    fail_on: Option<usize>,
    /// Number of leading requests rejected with a rate-limit error
    quota_failures: AtomicUsize,
    /// 1-based request number that cancels the job and never answers
    cancel_on: Option<(usize, CancellationToken)>,
}

impl MockImages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(request: usize) -> Self {
        Self {
            fail_on: Some(request),
            ..Self::default()
        }
    }

    pub fn with_quota_failures(count: usize) -> Self {
        Self {
            quota_failures: AtomicUsize::new(count),
            ..Self::default()
        }
    }

    pub fn cancelling_on(request: usize, cancel: CancellationToken) -> Self {
        Self {
            cancel_on: Some((request, cancel)),
            ..Self::default()
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn requests(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageGenerator for MockImages {
    async fn generate(&self, request: &ImageRequest) -> std::result::Result<String, ImageApiError> {
        let n = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(request.prompt.clone());
            prompts.len()
        };

        if let Some((_, cancel)) = self.cancel_on.as_ref().filter(|(at, _)| *at == n) {
            cancel.cancel();
            std::future::pending::<()>().await;
        }

        if self.fail_on == Some(n) {
            return Err(ImageApiError::Api {
                status: 400,
                code: Some("content_policy_violation".to_string()),
                message: "rejected".to_string(),
            });
        }

        let remaining = self.quota_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.quota_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ImageApiError::Api {
                status: 429,
                code: Some(RATE_LIMIT_CODE.to_string()),
                message: "Rate limit reached".to_string(),
            });
        }

        Ok(format!("https://images.test/frame-{n}.png"))
    }
}

/// Fetcher serving generated JPEGs, plus fixed bodies for chosen URLs
#[derive(Default)]
pub struct MemoryFetcher {
    fixed: HashMap<String, Vec<u8>>,
    fetched: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, body: Vec<u8>) -> Self {
        self.fixed.insert(url.to_string(), body);
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetFetcher for MemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let n = {
            let mut fetched = self.fetched.lock().unwrap();
            fetched.push(url.to_string());
            fetched.len()
        };
        if let Some(body) = self.fixed.get(url) {
            return Ok(body.clone());
        }
        Ok(jpeg_bytes(&generate_numbered_image(32, 32, n as u32), 80))
    }
}

/// One recorded engine invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    pub args: Vec<String>,
    /// Files present in the working directory when the command ran
    pub files: Vec<String>,
    /// Contents of the concat manifest, if staged
    pub manifest: Option<String>,
}

/// Engine that records commands and writes placeholder output
#[derive(Default)]
pub struct FakeEngine {
    invocations: Mutex<Vec<Invocation>>,
    fail: bool,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn exec(&self, workdir: &Path, args: &[String]) -> Result<()> {
        let mut files: Vec<String> = std::fs::read_dir(workdir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        let manifest = std::fs::read_to_string(workdir.join("concat.txt")).ok();

        self.invocations.lock().unwrap().push(Invocation {
            args: args.to_vec(),
            files,
            manifest,
        });

        if self.fail {
            return Err(Error::EncodeFailed("Invalid filter graph".to_string()));
        }

        if let Some(output) = args.last() {
            std::fs::write(workdir.join(output), b"\0\0\0\x18ftypisom fake video")?;
        }
        Ok(())
    }
}

/// Loader handing out a shared [`FakeEngine`]
pub struct FakeLoader {
    engine: Arc<FakeEngine>,
    loads: Arc<AtomicUsize>,
}

impl FakeLoader {
    pub fn new(engine: Arc<FakeEngine>) -> Self {
        Self {
            engine,
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.loads.clone()
    }
}

#[async_trait]
impl EngineLoader for FakeLoader {
    async fn load(&self) -> Result<Arc<dyn Engine>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.engine.clone())
    }
}

/// Loader that never produces an engine
pub struct FailingLoader;

#[async_trait]
impl EngineLoader for FailingLoader {
    async fn load(&self) -> Result<Arc<dyn Engine>> {
        Err(Error::EngineInitFailed(
            "engine binary could not be loaded".to_string(),
        ))
    }
}

/// Observer collecting every event
pub fn collecting_observer() -> (Arc<dyn ProgressObserver>, Arc<Mutex<Vec<ProgressEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let observer: Arc<dyn ProgressObserver> =
        Arc::new(move |event: &ProgressEvent| sink.lock().unwrap().push(event.clone()));
    (observer, events)
}

/// Staging root that outlives nothing but the test
pub fn staging_root(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("staging")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_test_image() {
        let img = generate_test_image(100, 100, [255, 0, 0, 255]);
        assert_eq!(img.width(), 100);
        assert_eq!(img.height(), 100);
    }

    #[test]
    fn test_jpeg_bytes_are_decodable() {
        let bytes = jpeg_bytes(&generate_numbered_image(16, 8, 1), 85);
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (16, 8));
    }
}
