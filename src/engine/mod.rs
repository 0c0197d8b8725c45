//! Encoding engine and job runner
//!
//! The engine is loaded lazily, once, and shared by every job. Loading is
//! single-flight and only remembered on success, so a failed load is tried
//! again by the next job. Executions are serialized by the handle itself.

mod ffmpeg;

pub use ffmpeg::{FfmpegEngine, FfmpegLoader};

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OnceCell};
use tokio_util::sync::CancellationToken;

use crate::command::EncodeCommand;
use crate::probe::{inspect_mp4, ContainerInfo};
use crate::staging::StagingArea;
use crate::{Error, Result};

/// Executes encoder commands against a working directory
#[async_trait]
pub trait Engine: Send + Sync {
    async fn exec(&self, workdir: &Path, args: &[String]) -> Result<()>;
}

/// Produces the engine on first use
#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn Engine>>;
}

/// Lazily-initialized, serialized access to one engine instance
pub struct EngineHandle {
    loader: Box<dyn EngineLoader>,
    engine: OnceCell<Arc<dyn Engine>>,
    exec_lock: Mutex<()>,
}

impl EngineHandle {
    pub fn new(loader: impl EngineLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            engine: OnceCell::new(),
            exec_lock: Mutex::new(()),
        }
    }

    /// Load the engine if needed; concurrent callers share one load
    pub async fn acquire(&self) -> Result<Arc<dyn Engine>> {
        let engine = self
            .engine
            .get_or_try_init(|| async {
                tracing::info!("Initializing encoding engine");
                self.loader.load().await.map_err(|e| match e {
                    Error::EngineInitFailed(_) => e,
                    other => Error::EngineInitFailed(other.to_string()),
                })
            })
            .await?;
        Ok(engine.clone())
    }

    pub fn is_loaded(&self) -> bool {
        self.engine.initialized()
    }

    /// Run one command; only one command runs at a time
    pub async fn exec(
        &self,
        workdir: &Path,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let engine = self.acquire().await?;

        let _guard = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            guard = self.exec_lock.lock() => guard,
        };

        // The engine cannot be interrupted once started.
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        engine.exec(workdir, args).await.map_err(|e| match e {
            Error::EncodeFailed(_) => e,
            other => Error::EncodeFailed(other.to_string()),
        })
    }
}

/// Bytes of an encoded video plus what could be read from its header
#[derive(Debug, Clone)]
pub struct EncodedVideo {
    pub bytes: Vec<u8>,
    pub info: Option<ContainerInfo>,
}

/// Runs encode commands inside a staging area and reads back the result
#[derive(Clone)]
pub struct EncodeRunner {
    handle: Arc<EngineHandle>,
}

impl EncodeRunner {
    pub fn new(handle: Arc<EngineHandle>) -> Self {
        Self { handle }
    }

    pub async fn run(
        &self,
        area: &StagingArea,
        command: &EncodeCommand,
        cancel: &CancellationToken,
    ) -> Result<EncodedVideo> {
        tracing::info!(command = %command, "Running encoder");

        self.handle.exec(area.root(), command.args(), cancel).await?;

        let bytes = area
            .read(command.output())
            .await
            .map_err(|e| Error::EncodeFailed(format!("Encoder produced no output: {}", e)))?;
        if bytes.is_empty() {
            return Err(Error::EncodeFailed("Encoder produced an empty file".to_string()));
        }

        let info = match inspect_mp4(&bytes) {
            Ok(info) => {
                tracing::info!(
                    size = bytes.len(),
                    width = info.width,
                    height = info.height,
                    duration_ms = info.duration.as_millis() as u64,
                    "Encoded video",
                );
                Some(info)
            }
            Err(e) => {
                tracing::warn!(size = bytes.len(), error = %e, "Could not inspect encoded output");
                None
            }
        };

        Ok(EncodedVideo { bytes, info })
    }
}
