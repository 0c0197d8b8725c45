//! Generation settings supplied by the caller

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, FPS};

/// Default clip length in seconds
pub const DEFAULT_DURATION_SECS: f64 = 10.0;

/// Shortest accepted clip length in seconds
pub const MIN_DURATION_SECS: f64 = 5.0;

/// Longest accepted clip length in seconds
pub const MAX_DURATION_SECS: f64 = 30.0;

/// Largest accepted width or height for custom dimensions
const MAX_DIMENSION: u32 = 7680;

/// Visual style applied to every frame prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VideoStyle {
    DigitalArt,
    Photographic,
    Pop,
    Cyberpunk,
    Anime,
    NeonPunk,
    Realistic,
    Comic,
    Tiktok,
}

impl VideoStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStyle::DigitalArt => "digital-art",
            VideoStyle::Photographic => "photographic",
            VideoStyle::Pop => "pop",
            VideoStyle::Cyberpunk => "cyberpunk",
            VideoStyle::Anime => "anime",
            VideoStyle::NeonPunk => "neon-punk",
            VideoStyle::Realistic => "realistic",
            VideoStyle::Comic => "comic",
            VideoStyle::Tiktok => "tiktok",
        }
    }
}

/// Content category, used as the focus suffix of frame prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VideoCategory {
    Quotes,
    HowTo,
    Facts,
    Tips,
    Stories,
    Explainer,
}

impl VideoCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoCategory::Quotes => "quotes",
            VideoCategory::HowTo => "how-to",
            VideoCategory::Facts => "facts",
            VideoCategory::Tips => "tips",
            VideoCategory::Stories => "stories",
            VideoCategory::Explainer => "explainer",
        }
    }
}

/// Output size presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VideoSize {
    LandscapeHd,
    #[serde(rename = "landscape-4k")]
    Landscape4k,
    PortraitHd,
    #[serde(rename = "square-1080")]
    Square1080,
    PortraitTiktok,
    LandscapeYoutube,
    Custom,
}

impl VideoSize {
    /// Preset resolution; `Custom` falls back to landscape HD
    pub fn dimensions(&self) -> Dimensions {
        let (width, height) = match self {
            VideoSize::LandscapeHd | VideoSize::Custom => (1920, 1080),
            VideoSize::Landscape4k => (3840, 2160),
            VideoSize::PortraitHd | VideoSize::PortraitTiktok => (1080, 1920),
            VideoSize::Square1080 => (1080, 1080),
            VideoSize::LandscapeYoutube => (2560, 1440),
        };
        Dimensions { width, height }
    }
}

/// Width/height pair in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    /// Round both sides down to even values (yuv420p requires it)
    pub fn to_even(self) -> Self {
        Self {
            width: (self.width / 2) * 2,
            height: (self.height / 2) * 2,
        }
    }
}

/// Pixel position of an overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

/// Vertical placement of the text overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextPosition {
    Top,
    #[default]
    Center,
    Bottom,
}

/// Drop shadow behind overlay text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextShadow {
    pub enabled: bool,
    pub color: String,
    /// Accepted for compatibility; the text filter cannot blur shadows
    #[serde(default)]
    pub blur: u32,
    pub offset: i32,
}

/// Text drawn over every frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextOverlay {
    pub enabled: bool,
    pub text: String,
    pub font: String,
    pub size: u32,
    pub color: String,
    pub background_color: String,
    pub position: TextPosition,
    pub padding: u32,
    pub shadow: Option<TextShadow>,
}

impl Default for TextOverlay {
    fn default() -> Self {
        Self {
            enabled: false,
            text: String::new(),
            font: String::new(),
            size: 48,
            color: "white".to_string(),
            background_color: "black@0.5".to_string(),
            position: TextPosition::Center,
            padding: 0,
            shadow: None,
        }
    }
}

/// Where a logo image comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogoSource {
    Url(String),
    File(PathBuf),
}

/// Logo composited over every frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoSettings {
    pub enabled: bool,
    pub source: Option<LogoSource>,
    /// Target logo width in pixels; height keeps the aspect ratio
    #[serde(default = "default_logo_size")]
    pub size: u32,
    pub coordinates: Option<Point>,
}

fn default_logo_size() -> u32 {
    100
}

impl LogoSettings {
    /// Overlay position, defaulting to 10,10
    pub fn position(&self) -> Point {
        self.coordinates.unwrap_or(Point { x: 10, y: 10 })
    }
}

/// Soundtrack copied into the output unmodified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AudioSource {
    File(PathBuf),
    Bytes { data: Vec<u8>, extension: String },
}

impl AudioSource {
    /// Container extension for the staged copy
    pub fn extension(&self) -> String {
        match self {
            AudioSource::File(path) => path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase())
                .unwrap_or_else(|| "mp3".to_string()),
            AudioSource::Bytes { extension, .. } => extension.trim_start_matches('.').to_string(),
        }
    }
}

/// Everything needed to produce one video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    pub prompt: String,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub creativity: f64,
    pub style: VideoStyle,
    pub category: VideoCategory,
    pub video_size: VideoSize,
    #[serde(default)]
    pub custom_dimensions: Option<Dimensions>,
    #[serde(default)]
    pub text_overlay: TextOverlay,
    #[serde(default)]
    pub logo: Option<LogoSettings>,
    #[serde(default)]
    pub audio: Option<AudioSource>,
}

impl GenerationSettings {
    /// Settings with defaults for everything but the prompt
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            duration: None,
            creativity: 0.7,
            style: VideoStyle::Photographic,
            category: VideoCategory::Explainer,
            video_size: VideoSize::LandscapeHd,
            custom_dimensions: None,
            text_overlay: TextOverlay::default(),
            logo: None,
            audio: None,
        }
    }

    /// Clip length in seconds
    pub fn duration_secs(&self) -> f64 {
        self.duration.unwrap_or(DEFAULT_DURATION_SECS)
    }

    /// Number of frames to generate: `ceil(duration * 24)`, at least one
    pub fn frame_count(&self) -> usize {
        let frames = (self.duration_secs() * FPS as f64).ceil();
        (frames as usize).max(1)
    }

    /// Output resolution, always even-sized
    pub fn resolution(&self) -> Dimensions {
        let dims = match (self.video_size, self.custom_dimensions) {
            (VideoSize::Custom, Some(custom)) => custom,
            (size, _) => size.dimensions(),
        };
        dims.to_even()
    }

    /// Logo settings if the logo is switched on
    pub fn active_logo(&self) -> Option<&LogoSettings> {
        self.logo.as_ref().filter(|logo| logo.enabled)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(Error::InvalidInput("Prompt must not be empty".to_string()));
        }

        let duration = self.duration_secs();
        if !duration.is_finite() || !(MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&duration) {
            return Err(Error::InvalidInput(format!(
                "Duration must be between {MIN_DURATION_SECS} and {MAX_DURATION_SECS} seconds, got {duration}"
            )));
        }

        if !(0.0..=1.0).contains(&self.creativity) {
            return Err(Error::InvalidInput(format!(
                "Creativity must be between 0 and 1, got {}",
                self.creativity
            )));
        }

        if self.video_size == VideoSize::Custom {
            if let Some(dims) = self.custom_dimensions {
                let even = dims.to_even();
                if even.width == 0 || even.height == 0 {
                    return Err(Error::InvalidInput(
                        "Custom width and height must be at least 2 pixels".to_string(),
                    ));
                }
                if dims.width > MAX_DIMENSION || dims.height > MAX_DIMENSION {
                    return Err(Error::InvalidInput(format!(
                        "Custom dimensions must not exceed {MAX_DIMENSION} pixels"
                    )));
                }
            }
        }

        if self.text_overlay.enabled && self.text_overlay.text.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Text overlay is enabled but has no text".to_string(),
            ));
        }

        if let Some(logo) = self.active_logo() {
            if logo.source.is_none() {
                return Err(Error::InvalidInput(
                    "Logo is enabled but has no source".to_string(),
                ));
            }
            if logo.size == 0 {
                return Err(Error::InvalidInput("Logo size must be non-zero".to_string()));
            }
        }

        Ok(())
    }

    /// Read settings from a JSON file.
    ///
    /// A missing or malformed file is bad input, not a staging problem.
    pub async fn from_json_file(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::InvalidInput(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::InvalidInput(format!("{}: {}", path.display(), e)))
    }
}
