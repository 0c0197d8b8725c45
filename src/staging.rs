//! Media staging area
//!
//! Each job gets its own temporary directory which the encoder uses as its
//! working directory. Files are write-once and addressed by generated names.
//! The directory and everything in it is removed when the area is dropped.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::TempDir;

use crate::probe::ImageInfo;
use crate::progress::{Phase, ProgressReporter, ENCODING_START, GENERATING_SHARE};
use crate::settings::{AudioSource, LogoSettings, LogoSource};
use crate::synth::GeneratedFrame;
use crate::{Error, Result};

/// Concat manifest file name
pub const MANIFEST_FILE: &str = "concat.txt";

/// Staged logo file name
pub const LOGO_FILE: &str = "logo.png";

/// Encoder output file name
pub const OUTPUT_FILE: &str = "output.mp4";

/// Zero-padded frame file name, so lexical order matches frame order
pub fn frame_filename(index: usize) -> String {
    format!("frame{:04}.jpg", index)
}

/// Staged audio file name for an extension
pub fn audio_filename(extension: &str) -> String {
    format!("audio.{}", extension)
}

/// Concat demuxer manifest listing `names` in the given order
pub fn manifest_contents<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|name| format!("file '{}'", name.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Job-scoped, write-once file store
pub struct StagingArea {
    dir: TempDir,
    files: BTreeSet<String>,
}

impl StagingArea {
    /// Create a fresh area under the system temp directory
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("promptreel-").tempdir()?;
        Ok(Self::with_dir(dir))
    }

    /// Create a fresh area under `root`
    pub fn new_in<P: AsRef<Path>>(root: P) -> Result<Self> {
        std::fs::create_dir_all(root.as_ref())?;
        let dir = tempfile::Builder::new()
            .prefix("promptreel-")
            .tempdir_in(root)?;
        Ok(Self::with_dir(dir))
    }

    fn with_dir(dir: TempDir) -> Self {
        tracing::debug!(path = %dir.path().display(), "Created staging area");
        Self {
            dir,
            files: BTreeSet::new(),
        }
    }

    /// Working directory for the encoder
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of a staged name
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Write a file; each name can only be written once
    pub async fn write(&mut self, name: &str, data: &[u8]) -> Result<PathBuf> {
        validate_name(name)?;
        if self.files.contains(name) {
            return Err(Error::StagingFailed(format!(
                "'{}' is already staged",
                name
            )));
        }

        let path = self.path(name);
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| Error::StagingFailed(format!("Failed to write '{}': {}", name, e)))?;
        self.files.insert(name.to_string());
        Ok(path)
    }

    /// Read a staged file, or a file the encoder produced in the area
    pub async fn read(&self, name: &str) -> Result<Vec<u8>> {
        validate_name(name)?;
        tokio::fs::read(self.path(name))
            .await
            .map_err(|e| Error::StagingFailed(format!("Failed to read '{}': {}", name, e)))
    }

    /// Remove every file in the area, keeping the directory
    pub async fn clear(&mut self) -> Result<()> {
        let mut entries = tokio::fs::read_dir(self.root()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&path).await?;
            } else {
                tokio::fs::remove_file(&path).await?;
            }
        }
        self.files.clear();
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    let plain = !name.is_empty()
        && !name.contains(['/', '\\', '\''])
        && name != "."
        && name != "..";
    if plain {
        Ok(())
    } else {
        Err(Error::StagingFailed(format!(
            "Invalid staging file name: '{}'",
            name
        )))
    }
}

/// Retrieves generated assets by URL
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// [`AssetFetcher`] over HTTP(S)
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::StagingFailed(format!("Failed to fetch {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::StagingFailed(format!(
                "Failed to fetch {}: HTTP {}",
                url,
                status.as_u16()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::StagingFailed(format!("Failed to read {}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }
}

/// Names of everything staged for one encode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedInputs {
    /// Frame file names in generation order
    pub frames: Vec<String>,
    pub manifest: String,
    pub audio: Option<String>,
    pub logo: Option<String>,
}

/// Fetch and write frames, manifest, audio and logo into `area`.
///
/// Frames are fetched one after another and the manifest lists them in
/// generation order. On failure the area is cleared before the error is
/// returned.
pub async fn stage(
    area: &mut StagingArea,
    fetcher: &dyn AssetFetcher,
    frames: &[GeneratedFrame],
    audio: Option<&AudioSource>,
    logo: Option<&LogoSettings>,
    reporter: &ProgressReporter,
) -> Result<StagedInputs> {
    match stage_inner(area, fetcher, frames, audio, logo, reporter).await {
        Ok(staged) => Ok(staged),
        Err(e) => {
            tracing::error!(error = %e, staged = area.len(), "Staging failed, clearing staging area");
            if let Err(cleanup) = area.clear().await {
                tracing::warn!(error = %cleanup, "Failed to clear staging area");
            }
            Err(e)
        }
    }
}

async fn stage_inner(
    area: &mut StagingArea,
    fetcher: &dyn AssetFetcher,
    frames: &[GeneratedFrame],
    audio: Option<&AudioSource>,
    logo: Option<&LogoSettings>,
    reporter: &ProgressReporter,
) -> Result<StagedInputs> {
    if frames.is_empty() {
        return Err(Error::StagingFailed("No frames to stage".to_string()));
    }

    let processing_share = ENCODING_START - GENERATING_SHARE;
    reporter.report(Phase::Processing, GENERATING_SHARE, "Processing frames...");

    let mut names = Vec::with_capacity(frames.len());
    for (position, frame) in frames.iter().enumerate() {
        let data = fetcher.fetch(&frame.url).await.inspect_err(|e| {
            tracing::error!(frame = frame.index + 1, url = %frame.url, error = %e, "Failed to fetch frame");
        })?;

        if ImageInfo::from_bytes(&data).is_err() {
            return Err(Error::StagingFailed(format!(
                "Frame {} is not a recognizable image",
                frame.index + 1
            )));
        }

        let name = frame_filename(position);
        area.write(&name, &data).await?;
        names.push(name);

        reporter.report(
            Phase::Processing,
            GENERATING_SHARE + (position + 1) as f64 / frames.len() as f64 * processing_share,
            format!("Processing frame {}/{}", position + 1, frames.len()),
        );
    }

    area.write(MANIFEST_FILE, manifest_contents(&names).as_bytes())
        .await?;

    let audio = match audio {
        Some(source) => Some(stage_audio(area, source).await?),
        None => None,
    };

    let logo = match logo {
        Some(settings) => Some(stage_logo(area, fetcher, settings).await?),
        None => None,
    };

    tracing::info!(
        frames = names.len(),
        audio = audio.is_some(),
        logo = logo.is_some(),
        "Staged encode inputs",
    );

    Ok(StagedInputs {
        frames: names,
        manifest: MANIFEST_FILE.to_string(),
        audio,
        logo,
    })
}

async fn stage_audio(area: &mut StagingArea, source: &AudioSource) -> Result<String> {
    let name = audio_filename(&source.extension());
    match source {
        AudioSource::File(path) => {
            let data = tokio::fs::read(path).await.map_err(|e| {
                Error::StagingFailed(format!("Failed to read audio {}: {}", path.display(), e))
            })?;
            area.write(&name, &data).await?;
        }
        AudioSource::Bytes { data, .. } => {
            area.write(&name, data).await?;
        }
    }
    Ok(name)
}

async fn stage_logo(
    area: &mut StagingArea,
    fetcher: &dyn AssetFetcher,
    settings: &LogoSettings,
) -> Result<String> {
    let data = match &settings.source {
        Some(LogoSource::Url(url)) => fetcher.fetch(url).await?,
        Some(LogoSource::File(path)) => tokio::fs::read(path).await.map_err(|e| {
            Error::StagingFailed(format!("Failed to read logo {}: {}", path.display(), e))
        })?,
        None => return Err(Error::StagingFailed("Logo has no source".to_string())),
    };

    let info = ImageInfo::from_bytes(&data)
        .map_err(|_| Error::StagingFailed("Logo is not a recognizable image".to_string()))?;
    tracing::debug!(
        width = info.width,
        height = info.height,
        scaled_height = info.height_for_width(settings.size),
        "Staging logo",
    );

    area.write(LOGO_FILE, &data).await?;
    Ok(LOGO_FILE.to_string())
}
