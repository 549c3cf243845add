//! live-ocr - Read text from a camera feed once the scene is steady
//!
//! Replays a directory of frames as a camera, runs stability-gated OCR on
//! the configured region and prints lifecycle notifications as they occur.

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use live_ocr::capture::{CameraQuality, ReplaySource};
use live_ocr::config::{self, AppConfig};
use live_ocr::vision::{RegionOfInterest, TesseractCli};
use live_ocr::{channel_handler, RealTimeEngine, RecognitionReliability, RecognitionState};

/// live-ocr - Stability-gated OCR over a camera feed
#[derive(Parser, Debug)]
#[command(name = "live-ocr")]
#[command(about = "Read text from a camera feed once the scene holds still")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of frames to replay as the camera
    #[arg(short, long)]
    frames: Option<PathBuf>,

    /// Region of interest in preview coordinates: x,y,width,height
    #[arg(short, long)]
    region: Option<RegionOfInterest>,

    /// Votes required before a result is reported
    #[arg(long, value_enum)]
    reliability: Option<RecognitionReliability>,

    /// Camera quality preset
    #[arg(long, value_enum)]
    quality: Option<CameraQuality>,

    /// Maximum frames per second
    #[arg(long)]
    fps: Option<u32>,

    /// Restart playback after the last frame
    #[arg(long = "loop")]
    loop_playback: bool,

    /// Keep recognizing after a result instead of exiting
    #[arg(long)]
    keep_going: bool,

    /// Print notifications as JSON lines
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Write the effective configuration and exit
    #[arg(long)]
    write_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = load_or_create_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args);

    if args.write_config {
        let path = match &args.config {
            Some(path) => path.clone(),
            None => config::default_config_path()?,
        };
        config::save_config(&config, &path)?;
        println!("Wrote configuration to {}", path.display());
        return Ok(());
    }

    let frames_dir = config
        .capture
        .frames_dir
        .clone()
        .context("No frames to replay: pass --frames or set capture.frames_dir")?;

    info!("live-ocr starting...");
    if config.region.is_none() {
        warn!("No region of interest set; frames will be checked for stability only");
    }

    let camera = ReplaySource::open(config.capture.replay_config(frames_dir.clone()))
        .with_context(|| format!("Failed to open frames in {}", frames_dir.display()))?;
    info!("Replaying {} frames from {:?}", camera.frame_count(), frames_dir);

    let recognizer = TesseractCli::new(config.ocr.tesseract_config());
    let mut engine = RealTimeEngine::from_config(&config, Box::new(camera), Box::new(recognizer));

    let (handler, events) = channel_handler();
    engine.set_handler(Some(handler));
    engine.start_preview()?;

    let mut last_printed: Option<RecognitionState> = None;
    let mut results = 0usize;
    loop {
        let state = match events.recv_timeout(Duration::from_millis(200)) {
            Ok(state) => state,
            Err(RecvTimeoutError::Timeout) => {
                if engine.is_preview_running() {
                    continue;
                }
                info!("Replay finished");
                break;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if last_printed.as_ref() != Some(&state) || state.is_terminal() {
            print_state(&state, args.json)?;
            last_printed = Some(state.clone());
        }

        if state.is_terminal() {
            results += 1;
            if !args.keep_going {
                break;
            }
            engine.set_recognition_active(true);
        }
    }

    engine.tear_down()?;
    if results == 0 {
        warn!("No text was recognized");
    }
    info!("live-ocr shutdown complete");

    Ok(())
}

/// Load configuration from file or fall back to defaults
fn load_or_create_config(explicit: Option<&std::path::Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        let config = config::load_config(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    if let Ok(config_path) = config::default_config_path() {
        if config_path.exists() {
            match config::load_config(&config_path) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", config_path);
                    return Ok(config);
                }
                Err(e) => warn!("Ignoring invalid configuration {:?}: {}", config_path, e),
            }
        }
    }
    info!("Using default configuration");
    Ok(AppConfig::default())
}

/// Command-line flags take precedence over the configuration file
fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(frames) = &args.frames {
        config.capture.frames_dir = Some(frames.clone());
    }
    if let Some(region) = args.region {
        config.region = Some(region);
    }
    if let Some(reliability) = args.reliability {
        config.engine.reliability = reliability;
    }
    if let Some(quality) = args.quality {
        config.capture.camera_quality = quality;
    }
    if let Some(fps) = args.fps {
        config.capture.max_fps = fps;
    }
    if args.loop_playback {
        config.capture.loop_playback = true;
    }
    if args.keep_going {
        config.engine.pause_on_result = false;
    }
}

fn print_state(state: &RecognitionState, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(state)?);
    } else {
        println!("{}", state);
    }
    Ok(())
}
