//! promptreel - Prompt-to-video assembly pipeline
//!
//! A prompt and a handful of settings become a short MP4:
//! - frames are generated one by one through a rate-limited image API queue
//! - the frames, audio and logo are staged in a job-scoped directory
//! - a filter chain (scale, text overlay, logo overlay) is built from the
//!   settings and ffmpeg assembles the clip at 24 fps
//! - the result is published as an in-process object URL
//!
//! [`VideoGenerator`] is the entry point.

pub mod blob;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod image_api;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod queue;
pub mod retry;
pub mod settings;
pub mod staging;
pub mod synth;

pub use blob::{Blob, BlobRegistry};
pub use config::PipelineConfig;
pub use error::{Error, ErrorCode, Result};
pub use pipeline::{VideoAsset, VideoGenerator, VideoGeneratorBuilder};
pub use progress::{Phase, ProgressEvent, ProgressObserver};
pub use settings::GenerationSettings;

/// Output frame rate; one generated image per frame
pub const FPS: u32 = 24;
