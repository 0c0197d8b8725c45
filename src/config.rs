//! Pipeline configuration from the environment

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::image_api::{DEFAULT_API_URL, DEFAULT_MODEL};
use crate::queue::RateLimitConfig;
use crate::{Error, Result};

/// Pipeline configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bearer token for the image API
    pub api_key: String,
    /// Image API host (default: `https://api.openai.com`)
    pub image_api_url: String,
    /// Image model (default: `dall-e-3`)
    pub image_model: String,
    /// Explicit ffmpeg binary; searched on `PATH` when unset
    pub ffmpeg_path: Option<PathBuf>,
    /// Limits for the image request queue
    pub rate_limit: RateLimitConfig,
    /// Parent directory for staging areas; system temp dir when unset
    pub staging_dir: Option<PathBuf>,
}

impl PipelineConfig {
    /// Load configuration from the process environment
    ///
    /// | Env Var                         | Default                  |
    /// |---------------------------------|--------------------------|
    /// | `OPENAI_API_KEY`                | required                 |
    /// | `PROMPTREEL_IMAGE_API_URL`      | `https://api.openai.com` |
    /// | `PROMPTREEL_IMAGE_MODEL`        | `dall-e-3`               |
    /// | `FFMPEG_PATH`                   | search `PATH`            |
    /// | `PROMPTREEL_RATE_LIMIT`         | `5`                      |
    /// | `PROMPTREEL_RATE_WINDOW_SECS`   | `60`                     |
    /// | `PROMPTREEL_MIN_SPACING_SECS`   | `12`                     |
    /// | `PROMPTREEL_TASK_TIMEOUT_SECS`  | `120` (`0` disables)     |
    /// | `PROMPTREEL_STAGING_DIR`        | system temp dir          |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = var("OPENAI_API_KEY")
            .ok_or_else(|| Error::Config("OPENAI_API_KEY must be set".to_string()))?;

        let defaults = RateLimitConfig::default();
        let max_requests = parse_or(&var, "PROMPTREEL_RATE_LIMIT", defaults.max_requests)?;
        if max_requests == 0 {
            return Err(Error::Config(
                "PROMPTREEL_RATE_LIMIT must be at least 1".to_string(),
            ));
        }
        let window_secs = parse_or(
            &var,
            "PROMPTREEL_RATE_WINDOW_SECS",
            defaults.window.as_secs(),
        )?;
        let spacing_secs = parse_or(
            &var,
            "PROMPTREEL_MIN_SPACING_SECS",
            defaults.min_spacing.as_secs(),
        )?;
        let timeout_secs = parse_or(
            &var,
            "PROMPTREEL_TASK_TIMEOUT_SECS",
            defaults.task_timeout.map_or(0, |t| t.as_secs()),
        )?;

        Ok(Self {
            api_key,
            image_api_url: var("PROMPTREEL_IMAGE_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.into()),
            image_model: var("PROMPTREEL_IMAGE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
            ffmpeg_path: var("FFMPEG_PATH").map(PathBuf::from),
            rate_limit: RateLimitConfig {
                max_requests,
                window: Duration::from_secs(window_secs),
                min_spacing: Duration::from_secs(spacing_secs),
                task_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            },
            staging_dir: var("PROMPTREEL_STAGING_DIR").map(PathBuf::from),
        })
    }
}

fn parse_or<T, V>(var: &V, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    V: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got '{raw}'"))),
        None => Ok(default),
    }
}
