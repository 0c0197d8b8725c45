use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use promptreel::progress::TracingObserver;
use promptreel::{Error, GenerationSettings, PipelineConfig, Result, VideoGenerator};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "promptreel", version)]
struct Args {
    /// Generation settings JSON
    settings: PathBuf,

    /// Output MP4 path
    output: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "promptreel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, code = ?e.code(), "Video generation failed");
            ExitCode::from(e.code() as u8)
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = PipelineConfig::from_env()?;
    let settings = GenerationSettings::from_json_file(&args.settings).await?;

    let generator = VideoGenerator::from_config(&config)
        .observer(Arc::new(TracingObserver))
        .build();

    let asset = generator.generate(&settings).await?;

    let blob = generator
        .blobs()
        .resolve(&asset.url)
        .ok_or_else(|| Error::EncodeFailed(format!("{} is no longer registered", asset.url)))?;
    tokio::fs::write(&args.output, &blob.data).await?;
    generator.blobs().revoke(&asset.url);

    tracing::info!(
        output = %args.output.display(),
        size = asset.size_bytes,
        width = asset.width,
        height = asset.height,
        "Wrote video",
    );
    Ok(())
}
