//! Encoding engine backed by an ffmpeg executable

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;

use super::{Engine, EngineLoader};
use crate::command::VIDEO_CODEC;
use crate::{Error, Result};

/// Locations tried when no explicit path is configured
const SEARCH_PATHS: [&str; 3] = ["ffmpeg", "/usr/bin/ffmpeg", "/usr/local/bin/ffmpeg"];

/// Loads [`FfmpegEngine`] after checking the binary can encode H.264
#[derive(Debug, Clone, Default)]
pub struct FfmpegLoader {
    ffmpeg_path: Option<PathBuf>,
}

impl FfmpegLoader {
    pub fn new(ffmpeg_path: Option<PathBuf>) -> Self {
        Self { ffmpeg_path }
    }
}

#[async_trait]
impl EngineLoader for FfmpegLoader {
    async fn load(&self) -> Result<Arc<dyn Engine>> {
        let binary = find_ffmpeg(self.ffmpeg_path.as_deref()).await?;
        check_encoder(&binary).await?;
        tracing::info!(binary = %binary.display(), "ffmpeg engine loaded");
        Ok(Arc::new(FfmpegEngine { binary }))
    }
}

/// Runs encode commands through an ffmpeg process
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    binary: PathBuf,
}

#[async_trait]
impl Engine for FfmpegEngine {
    async fn exec(&self, workdir: &Path, args: &[String]) -> Result<()> {
        let output = Command::new(&self.binary)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
            .args(args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::EncodeFailed(format!("Failed to start ffmpeg: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::EncodeFailed(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

/// Find an ffmpeg executable that runs
async fn find_ffmpeg(custom_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = custom_path {
        if runs(path).await {
            return Ok(path.to_path_buf());
        }
        return Err(Error::EngineInitFailed(format!(
            "ffmpeg not found at: {}",
            path.display()
        )));
    }

    for candidate in SEARCH_PATHS {
        let path = Path::new(candidate);
        if runs(path).await {
            return Ok(path.to_path_buf());
        }
    }

    Err(Error::EngineInitFailed(
        "ffmpeg not found in PATH".to_string(),
    ))
}

async fn runs(path: &Path) -> bool {
    Command::new(path)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Check the binary was built with the H.264 encoder
async fn check_encoder(binary: &Path) -> Result<()> {
    let output = Command::new(binary)
        .args(["-hide_banner", "-encoders"])
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|e| Error::EngineInitFailed(format!("Failed to run ffmpeg: {}", e)))?;

    let encoders = String::from_utf8_lossy(&output.stdout);
    if encoders.contains(VIDEO_CODEC) {
        Ok(())
    } else {
        Err(Error::EngineInitFailed(format!(
            "ffmpeg does not have {} support",
            VIDEO_CODEC
        )))
    }
}
