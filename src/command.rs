//! Encoder command lines

use crate::filter::{DrawText, Filter, FilterArg, FilterChain, VIDEO_OUT_LABEL};
use crate::settings::GenerationSettings;
use crate::staging::{StagedInputs, OUTPUT_FILE};
use crate::FPS;

/// Video codec for all output
pub const VIDEO_CODEC: &str = "libx264";

/// Encoder speed/quality preset
pub const PRESET: &str = "medium";

/// Constant rate factor
pub const CRF: u32 = 23;

/// Name of a staged video for the watermark pass
pub const WATERMARK_INPUT_FILE: &str = "input.mp4";

/// A complete encoder invocation, run inside the staging area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeCommand {
    args: Vec<String>,
    output: String,
}

impl EncodeCommand {
    /// Assemble frames (plus optional audio and logo) into an MP4.
    ///
    /// Input 0 is the concat manifest read at 24 fps; audio, then logo,
    /// follow as further inputs.
    pub fn build(settings: &GenerationSettings, staged: &StagedInputs) -> Self {
        let mut args: Vec<String> = vec!["-y".into()];

        args.extend(["-f", "concat", "-safe", "0", "-r"].map(String::from));
        args.push(FPS.to_string());
        args.extend(["-i".to_string(), staged.manifest.clone()]);

        let mut next_input = 1;
        let audio_input = staged.audio.as_ref().map(|audio| {
            args.extend(["-i".to_string(), audio.clone()]);
            next_input += 1;
            next_input - 1
        });
        let logo_input = staged.logo.as_ref().map(|logo| {
            args.extend(["-i".to_string(), logo.clone()]);
            next_input += 1;
            next_input - 1
        });

        let chain = FilterChain::from_settings(settings, logo_input);
        push_filters(&mut args, &chain);

        if let Some(index) = audio_input {
            args.extend(["-map".to_string(), format!("{}:a", index)]);
        }

        push_video_codec(&mut args);

        if audio_input.is_some() {
            args.extend(["-c:a", "copy", "-shortest"].map(String::from));
        } else {
            args.push("-an".into());
        }

        args.extend(["-movflags", "+faststart"].map(String::from));
        args.push(OUTPUT_FILE.into());

        Self {
            args,
            output: OUTPUT_FILE.to_string(),
        }
    }

    /// Re-encode a staged video with a text watermark, copying its audio
    pub fn watermark(input: &str, text: &str) -> Self {
        let mut args: Vec<String> = vec!["-y".into(), "-i".into(), input.to_string()];

        let mut chain = FilterChain::new();
        chain.push(Filter::DrawText(DrawText::watermark(text)));
        push_filters(&mut args, &chain);
        args.extend(["-map", "0:a?"].map(String::from));

        push_video_codec(&mut args);
        args.extend(["-c:a", "copy", "-movflags", "+faststart"].map(String::from));
        args.push(OUTPUT_FILE.into());

        Self {
            args,
            output: OUTPUT_FILE.to_string(),
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// File the command writes, relative to the staging area
    pub fn output(&self) -> &str {
        &self.output
    }

    /// The filter argument, if any
    pub fn filter_arg(&self) -> Option<&str> {
        self.args
            .windows(2)
            .find(|pair| pair[0] == "-vf" || pair[0] == "-filter_complex")
            .map(|pair| pair[1].as_str())
    }
}

impl std::fmt::Display for EncodeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ffmpeg {}", self.args.join(" "))
    }
}

fn push_filters(args: &mut Vec<String>, chain: &FilterChain) {
    if chain.is_empty() {
        args.extend(["-map", "0:v"].map(String::from));
        return;
    }
    match chain.render() {
        FilterArg::Chain(chain) => {
            args.extend(["-vf".to_string(), chain]);
            args.extend(["-map", "0:v"].map(String::from));
        }
        FilterArg::Graph(graph) => {
            args.extend(["-filter_complex".to_string(), graph]);
            args.extend(["-map".to_string(), format!("[{}]", VIDEO_OUT_LABEL)]);
        }
    }
}

fn push_video_codec(args: &mut Vec<String>) {
    args.extend(["-c:v", VIDEO_CODEC, "-preset", PRESET, "-crf"].map(String::from));
    args.push(CRF.to_string());
    args.extend(["-pix_fmt", "yuv420p"].map(String::from));
}
