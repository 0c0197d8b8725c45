//! Filter chain construction
//!
//! Filters are built as a typed list and only rendered to ffmpeg's textual
//! syntax at the end. Order matters: each filter runs on the output of the
//! one before it, so scaling always comes first.

use crate::settings::{Dimensions, GenerationSettings, TextOverlay, TextPosition};

/// Distance of top/bottom text from the frame edge, in pixels
pub const TEXT_EDGE_OFFSET: u32 = 20;

/// Label of the final video stream of a filter graph
pub const VIDEO_OUT_LABEL: &str = "vout";

/// Text drawing parameters
#[derive(Debug, Clone, PartialEq)]
pub struct DrawText {
    pub text: String,
    pub font: Option<String>,
    pub font_size: u32,
    pub font_color: String,
    /// Background box colour; `None` draws no box
    pub box_color: Option<String>,
    pub box_border: u32,
    pub x: String,
    pub y: String,
    pub shadow: Option<Shadow>,
}

/// Text shadow parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Shadow {
    pub color: String,
    pub x: i32,
    pub y: i32,
}

/// Composite a second input stream onto the video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlay {
    /// Input index of the overlaid image
    pub input: usize,
    pub x: u32,
    pub y: u32,
    /// Overlay width; height follows the aspect ratio
    pub width: u32,
}

/// One image-processing step
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Scale { width: u32, height: u32 },
    DrawText(DrawText),
    Overlay(Overlay),
}

impl Filter {
    fn render_single(&self) -> String {
        match self {
            Filter::Scale { width, height } => format!("scale={}:{}", width, height),
            Filter::DrawText(text) => render_drawtext(text),
            Filter::Overlay(overlay) => format!("overlay={}:{}", overlay.x, overlay.y),
        }
    }
}

/// Rendered filter argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterArg {
    /// Flat chain for `-vf`
    Chain(String),
    /// Labelled graph for `-filter_complex`, ending in [`VIDEO_OUT_LABEL`]
    Graph(String),
}

/// Ordered list of filters
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterChain {
    filters: Vec<Filter>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: Filter) -> &mut Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Scale, then text (if enabled), then logo overlay (if staged)
    pub fn from_settings(settings: &GenerationSettings, logo_input: Option<usize>) -> Self {
        let Dimensions { width, height } = settings.resolution();
        let mut chain = Self::new();
        chain.push(Filter::Scale { width, height });

        if settings.text_overlay.enabled {
            chain.push(Filter::DrawText(DrawText::from_overlay(&settings.text_overlay)));
        }

        if let (Some(input), Some(logo)) = (logo_input, settings.active_logo()) {
            let position = logo.position();
            chain.push(Filter::Overlay(Overlay {
                input,
                x: position.x,
                y: position.y,
                width: logo.size,
            }));
        }

        chain
    }

    fn has_overlay(&self) -> bool {
        self.filters
            .iter()
            .any(|f| matches!(f, Filter::Overlay(_)))
    }

    /// Render to ffmpeg syntax.
    ///
    /// Without overlays the filters are joined with commas. Each overlay
    /// splits the chain: the video so far is labelled, the overlay input is
    /// scaled into its own label, and the two are composited.
    pub fn render(&self) -> FilterArg {
        if !self.has_overlay() {
            let chain = self
                .filters
                .iter()
                .map(Filter::render_single)
                .collect::<Vec<_>>()
                .join(",");
            return FilterArg::Chain(chain);
        }

        let mut segments = Vec::new();
        let mut head = "[0:v]".to_string();
        let mut pending: Vec<String> = Vec::new();
        let mut overlays = 0;

        for filter in &self.filters {
            match filter {
                Filter::Overlay(overlay) => {
                    let base = format!("base{}", overlays);
                    let logo = format!("logo{}", overlays);
                    let body = if pending.is_empty() {
                        "null".to_string()
                    } else {
                        pending.join(",")
                    };
                    segments.push(format!("{}{}[{}]", head, body, base));
                    segments.push(format!(
                        "[{}:v]scale={}:-1[{}]",
                        overlay.input, overlay.width, logo
                    ));
                    head = format!("[{}][{}]", base, logo);
                    pending = vec![filter.render_single()];
                    overlays += 1;
                }
                other => pending.push(other.render_single()),
            }
        }

        segments.push(format!("{}{}[{}]", head, pending.join(","), VIDEO_OUT_LABEL));
        FilterArg::Graph(segments.join(";"))
    }
}

impl DrawText {
    /// Centered text from overlay settings
    pub fn from_overlay(overlay: &TextOverlay) -> Self {
        let y = match overlay.position {
            TextPosition::Top => TEXT_EDGE_OFFSET.to_string(),
            TextPosition::Center => "(h-text_h)/2".to_string(),
            TextPosition::Bottom => format!("h-text_h-{}", TEXT_EDGE_OFFSET),
        };

        let shadow = overlay
            .shadow
            .as_ref()
            .filter(|s| s.enabled)
            .map(|s| Shadow {
                color: s.color.clone(),
                x: s.offset,
                y: s.offset,
            });

        Self {
            text: overlay.text.clone(),
            font: Some(overlay.font.trim().to_string()).filter(|f| !f.is_empty()),
            font_size: if overlay.size == 0 { 48 } else { overlay.size },
            font_color: non_empty_or(&overlay.color, "white"),
            box_color: Some(non_empty_or(&overlay.background_color, "black@0.5")),
            box_border: overlay.padding,
            x: "(w-text_w)/2".to_string(),
            y,
            shadow,
        }
    }

    /// Watermark style: top-left, shadowed, on a translucent box
    pub fn watermark(text: &str) -> Self {
        Self {
            text: text.to_string(),
            font: None,
            font_size: 24,
            font_color: "white".to_string(),
            box_color: Some("black@0.5".to_string()),
            box_border: 5,
            x: "10".to_string(),
            y: "10".to_string(),
            shadow: Some(Shadow {
                color: "black".to_string(),
                x: 2,
                y: 2,
            }),
        }
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

fn render_drawtext(text: &DrawText) -> String {
    let mut options = vec![format!("text={}", escape_value(&text.text))];
    if let Some(font) = &text.font {
        options.push(format!("font={}", escape_value(font)));
    }
    options.push("expansion=none".to_string());
    options.push(format!("fontsize={}", text.font_size));
    options.push(format!("fontcolor={}", escape_value(&text.font_color)));
    if let Some(shadow) = &text.shadow {
        options.push(format!("shadowcolor={}", escape_value(&shadow.color)));
        options.push(format!("shadowx={}", shadow.x));
        options.push(format!("shadowy={}", shadow.y));
    }
    if let Some(color) = &text.box_color {
        options.push("box=1".to_string());
        options.push(format!("boxcolor={}", escape_value(color)));
        if text.box_border > 0 {
            options.push(format!("boxborderw={}", text.box_border));
        }
    }
    options.push(format!("x={}", text.x));
    options.push(format!("y={}", text.y));

    format!("drawtext={}", options.join(":"))
}

/// Escape a filter option value for both the option parser and the
/// filtergraph parser.
pub fn escape_value(value: &str) -> String {
    let mut option_level = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '\'' | ':') {
            option_level.push('\\');
        }
        option_level.push(c);
    }

    let mut graph_level = String::with_capacity(option_level.len());
    for c in option_level.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            graph_level.push('\\');
        }
        graph_level.push(c);
    }
    graph_level
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{LogoSettings, LogoSource, Point, TextShadow, VideoSize};

    fn settings() -> GenerationSettings {
        let mut settings = GenerationSettings::new("coffee");
        settings.video_size = VideoSize::Square1080;
        settings
    }

    #[test]
    fn test_scale_only() {
        let chain = FilterChain::from_settings(&settings(), None);
        assert_eq!(chain.render(), FilterArg::Chain("scale=1080:1080".to_string()));
    }

    #[test]
    fn test_text_position_expressions() {
        let mut overlay = TextOverlay {
            enabled: true,
            text: "Hi".to_string(),
            ..Default::default()
        };
        overlay.position = TextPosition::Top;
        assert_eq!(DrawText::from_overlay(&overlay).y, "20");
        overlay.position = TextPosition::Center;
        assert_eq!(DrawText::from_overlay(&overlay).y, "(h-text_h)/2");
        overlay.position = TextPosition::Bottom;
        let text = DrawText::from_overlay(&overlay);
        assert_eq!(text.y, "h-text_h-20");
        assert_eq!(text.x, "(w-text_w)/2");
    }

    #[test]
    fn test_drawtext_rendering() {
        let mut settings = settings();
        settings.text_overlay = TextOverlay {
            enabled: true,
            text: "Sale!".to_string(),
            padding: 8,
            shadow: Some(TextShadow {
                enabled: true,
                color: "black".to_string(),
                blur: 4,
                offset: 3,
            }),
            position: TextPosition::Bottom,
            ..Default::default()
        };

        let FilterArg::Chain(chain) = FilterChain::from_settings(&settings, None).render() else {
            panic!("expected a flat chain");
        };
        assert_eq!(
            chain,
            "scale=1080:1080,drawtext=text=Sale!:expansion=none:fontsize=48:fontcolor=white:\
             shadowcolor=black:shadowx=3:shadowy=3:box=1:boxcolor=black@0.5:boxborderw=8:\
             x=(w-text_w)/2:y=h-text_h-20"
        );
    }

    #[test]
    fn test_escape_value() {
        assert_eq!(escape_value("Sale!"), "Sale!");
        assert_eq!(escape_value("a:b"), "a\\\\:b");
        assert_eq!(escape_value("it's"), "it\\\\\\'s");
        assert_eq!(escape_value("x,y"), "x\\,y");
    }

    #[test]
    fn test_logo_uses_labelled_graph() {
        let mut settings = settings();
        settings.logo = Some(LogoSettings {
            enabled: true,
            source: Some(LogoSource::Url("https://cdn/logo.png".to_string())),
            size: 120,
            coordinates: Some(Point { x: 30, y: 40 }),
        });

        let chain = FilterChain::from_settings(&settings, Some(1));
        assert_eq!(
            chain.render(),
            FilterArg::Graph(
                "[0:v]scale=1080:1080[base0];[1:v]scale=120:-1[logo0];[base0][logo0]overlay=30:40[vout]"
                    .to_string()
            )
        );
    }

    #[test]
    fn test_overlay_without_preceding_filters() {
        let mut chain = FilterChain::new();
        chain.push(Filter::Overlay(Overlay {
            input: 2,
            x: 0,
            y: 0,
            width: 50,
        }));
        assert_eq!(
            chain.render(),
            FilterArg::Graph(
                "[0:v]null[base0];[2:v]scale=50:-1[logo0];[base0][logo0]overlay=0:0[vout]"
                    .to_string()
            )
        );
    }

    #[test]
    fn test_disabled_logo_is_ignored() {
        let mut settings = settings();
        settings.logo = Some(LogoSettings {
            enabled: false,
            source: Some(LogoSource::Url("https://cdn/logo.png".to_string())),
            size: 120,
            coordinates: None,
        });
        let chain = FilterChain::from_settings(&settings, Some(1));
        assert_eq!(chain.filters().len(), 1);
    }
}
