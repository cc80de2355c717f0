//! `kinelens` binary: capture one or more views and write the oracle request as JSON.
//!
//! ```bash
//! kinelens --view Front=frames/front --view Side=frames/side --smart-search -o request.json
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kinelens::capture::{CaptureOptions, CaptureOrchestrator, ViewInput};
use kinelens::config::Config;
use kinelens::oracle::OracleRequest;
use kinelens::pose::{DisabledPose, ObjectDetector, PoseSource};
use kinelens::telemetry::OverlayRenderer;
use kinelens::video::{FrameSequence, SeekableSource};

#[derive(Parser, Debug)]
#[command(name = "kinelens", version = env!("GIT_VERSION"), about = "Multi-view movement capture with pose telemetry")]
struct Args {
    /// View to capture as LABEL=PATH: a directory of frames, or a video file (desktop builds)
    #[arg(long = "view", value_name = "LABEL=PATH", required = true, value_parser = parse_view)]
    views: Vec<(String, PathBuf)>,

    /// Frame rate of frame directories
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// Frames per view (overrides `capture.frame_count`)
    #[arg(long)]
    count: Option<usize>,

    /// Center the frames on the detected peak of the movement
    #[arg(long, default_value_t = false)]
    smart_search: bool,

    /// Movement the athlete says they are performing
    #[arg(long)]
    skill: Option<String>,

    #[arg(short, long, value_name = "FILE", default_value = "kinelens.toml")]
    config: PathBuf,

    /// Write the request here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

fn parse_view(s: &str) -> std::result::Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((label, path)) if !label.trim().is_empty() && !path.is_empty() => {
            Ok((label.trim().to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected LABEL=PATH, got '{s}'")),
    }
}

fn open_source(path: &Path, fps: f64) -> Result<Box<dyn SeekableSource>> {
    if path.is_dir() {
        let seq = FrameSequence::from_dir(path, fps)
            .with_context(|| format!("failed to load frames from {}", path.display()))?;
        return Ok(Box::new(seq));
    }

    #[cfg(feature = "desktop")]
    {
        let video = kinelens::video::OpenCvVideo::open(path)
            .with_context(|| format!("failed to open video {}", path.display()))?;
        return Ok(Box::new(video));
    }
    #[cfg(not(feature = "desktop"))]
    anyhow::bail!(
        "{} is not a frame directory; video files need the `desktop` feature",
        path.display()
    );
}

#[cfg(feature = "onnx")]
fn pose_source(config: &Config) -> Box<dyn PoseSource> {
    use kinelens::pose::{OnnxPoseLoader, PoseService};
    match &config.pose.model_path {
        Some(path) => {
            info!("pose model: {}", path.display());
            Box::new(PoseService::new(OnnxPoseLoader::new(config.pose.clone())))
        }
        None => {
            info!("no pose model configured; frames are captured without telemetry");
            Box::new(DisabledPose)
        }
    }
}

#[cfg(not(feature = "onnx"))]
fn pose_source(config: &Config) -> Box<dyn PoseSource> {
    if config.pose.model_path.is_some() {
        tracing::warn!("pose.model_path is set but this build has no `onnx` feature");
    }
    Box::new(DisabledPose)
}

#[cfg(feature = "onnx")]
fn object_detector(config: &Config) -> Result<Option<Box<dyn ObjectDetector>>> {
    if config.object.model_path.is_none() {
        return Ok(None);
    }
    let detector = kinelens::pose::OnnxObjectDetector::new(&config.object)?;
    Ok(Some(Box::new(detector)))
}

#[cfg(not(feature = "onnx"))]
fn object_detector(config: &Config) -> Result<Option<Box<dyn ObjectDetector>>> {
    if config.object.model_path.is_some() {
        tracing::warn!("object.model_path is set but this build has no `onnx` feature");
    }
    Ok(None)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();
    info!("kinelens ({})", env!("GIT_VERSION"));

    let config = Config::load_or_default(&args.config);
    let mut options = CaptureOptions::from_config(&config.capture);
    if let Some(count) = args.count {
        options.frame_count = count;
    }
    options.smart_search = args.smart_search;
    options.user_declared_skill = args.skill.clone();

    let mut views = Vec::with_capacity(args.views.len());
    for (label, path) in &args.views {
        views.push(ViewInput::new(label.clone(), open_source(path, args.fps)?));
    }

    let pose = pose_source(&config);
    let objects = object_detector(&config)?;
    let overlay = OverlayRenderer::from_config(&config.overlay, config.analysis.landmark_gate)?;

    let mut orchestrator = CaptureOrchestrator::new(pose.as_ref(), &config).with_overlay(&overlay);
    if let Some(detector) = objects.as_deref() {
        orchestrator = orchestrator.with_object_detector(detector);
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling capture");
                cancel.cancel();
            }
        });
    }

    let payload = orchestrator
        .capture(&mut views, &options, &cancel)
        .await
        .context("capture failed")?;
    let request = OracleRequest::from_payload(&payload);
    let json = request.to_json()?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
            info!("wrote {} image(s) to {}", request.image_count(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
