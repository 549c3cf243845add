//! Replay camera
//!
//! Plays a directory of still images back as a live frame stream, paced to
//! a maximum frame rate. Digital zoom is a center crop scaled back up to the
//! quality preset.

use image::{imageops, RgbaImage};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{
    CameraQuality, CameraSource, DeviceOrientation, Frame, FrameSink, PreviewSurface,
    VideoOrientation, Zoomable,
};
use crate::error::CaptureError;

const FRAME_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tiff"];

/// Replay configuration
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Directory holding the frames, played in file name order
    pub directory: PathBuf,
    /// Maximum frames per second to deliver
    pub max_fps: u32,
    /// Start over after the last frame
    pub loop_playback: bool,
    /// Output quality preset
    pub quality: CameraQuality,
    /// Orientation stamped on every frame
    pub orientation: DeviceOrientation,
    /// Upper digital zoom bound
    pub max_zoom: f32,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::new(),
            max_fps: 30,
            loop_playback: false,
            quality: CameraQuality::default(),
            orientation: DeviceOrientation::default(),
            max_zoom: 4.0,
        }
    }
}

/// Settings the playback thread reads on every frame
#[derive(Debug)]
struct PlaybackState {
    sink: Option<FrameSink>,
    quality: CameraQuality,
    zoom_factor: f32,
    orientation: DeviceOrientation,
}

/// Camera source backed by image files on disk
pub struct ReplaySource {
    config: ReplayConfig,
    frames: Arc<Vec<PathBuf>>,
    state: Arc<RwLock<PlaybackState>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    preview: Option<PreviewSurface>,
    video_orientation: VideoOrientation,
    focus_point: Option<(f32, f32)>,
}

impl ReplaySource {
    /// Open a frame directory. Fails if it holds no image files.
    pub fn open(config: ReplayConfig) -> Result<Self, CaptureError> {
        let frames = list_frames(&config.directory)?;
        info!(
            "Replay source opened {} frames from {:?}",
            frames.len(),
            config.directory
        );

        let state = PlaybackState {
            sink: None,
            quality: config.quality,
            zoom_factor: 1.0,
            orientation: config.orientation,
        };

        Ok(Self {
            video_orientation: VideoOrientation::from_device(config.orientation)
                .unwrap_or_default(),
            config,
            frames: Arc::new(frames),
            state: Arc::new(RwLock::new(state)),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
            preview: None,
            focus_point: None,
        })
    }

    /// Number of frames in one pass
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Surface the preview was last bound to
    pub fn preview(&self) -> Option<PreviewSurface> {
        self.preview
    }

    pub fn video_orientation(&self) -> VideoOrientation {
        self.video_orientation
    }

    pub fn focus_point(&self) -> Option<(f32, f32)> {
        self.focus_point
    }

    fn join_playback(&mut self) -> Result<(), CaptureError> {
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| CaptureError::ThreadPanicked)?;
        }
        Ok(())
    }
}

impl CameraSource for ReplaySource {
    fn start(&mut self) -> Result<(), CaptureError> {
        if self.is_running() {
            return Ok(());
        }
        self.join_playback()?;

        self.running.store(true, Ordering::SeqCst);
        let frames = self.frames.clone();
        let state = self.state.clone();
        let running = self.running.clone();
        let max_fps = self.config.max_fps;
        let loop_playback = self.config.loop_playback;

        self.handle = Some(std::thread::spawn(move || {
            debug!("Replay thread starting...");
            playback_loop(&frames, &state, &running, max_fps, loop_playback);
            running.store(false, Ordering::SeqCst);
            debug!("Replay thread exiting...");
        }));

        info!("Replay started at up to {} fps", max_fps);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.running.store(false, Ordering::SeqCst);
        self.join_playback()
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn bind_preview(&mut self, surface: PreviewSurface) {
        self.preview = Some(surface);
    }

    fn set_frame_sink(&mut self, sink: Option<FrameSink>) {
        self.state.write().sink = sink;
    }

    fn quality(&self) -> CameraQuality {
        self.state.read().quality
    }

    fn set_quality(&mut self, quality: CameraQuality) -> Result<(), CaptureError> {
        debug!("Replay quality set to {:?}", quality);
        self.state.write().quality = quality;
        Ok(())
    }

    fn set_video_orientation(&mut self, orientation: VideoOrientation) {
        self.video_orientation = orientation;
        self.state.write().orientation = DeviceOrientation::from(orientation);
    }

    fn set_focus_point(&mut self, point: (f32, f32)) {
        debug!("Replay focus point moved to {:?}", point);
        self.focus_point = Some(point);
    }

    fn as_zoomable(&self) -> Option<&dyn Zoomable> {
        Some(self)
    }

    fn as_zoomable_mut(&mut self) -> Option<&mut dyn Zoomable> {
        Some(self)
    }
}

impl Zoomable for ReplaySource {
    fn zoom_factor(&self) -> f32 {
        self.state.read().zoom_factor
    }

    fn set_zoom_factor(&mut self, factor: f32) {
        if factor <= self.min_zoom_factor() || factor >= self.max_zoom_factor() {
            return;
        }
        self.state.write().zoom_factor = factor;
    }

    fn max_zoom_factor(&self) -> f32 {
        self.config.max_zoom
    }
}

impl Drop for ReplaySource {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Collect image files in a directory, sorted by name
fn list_frames(directory: &Path) -> Result<Vec<PathBuf>, CaptureError> {
    let mut frames: Vec<PathBuf> = std::fs::read_dir(directory)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();

    if frames.is_empty() {
        return Err(CaptureError::NoFrames(directory.to_path_buf()));
    }

    frames.sort();
    Ok(frames)
}

fn playback_loop(
    frames: &[PathBuf],
    state: &RwLock<PlaybackState>,
    running: &AtomicBool,
    max_fps: u32,
    loop_playback: bool,
) {
    let interval = Duration::from_secs_f64(1.0 / max_fps.max(1) as f64);

    'playback: loop {
        for path in frames {
            if !running.load(Ordering::SeqCst) {
                break 'playback;
            }
            let started = Instant::now();

            let (quality, zoom, orientation, sink) = {
                let state = state.read();
                (state.quality, state.zoom_factor, state.orientation, state.sink.clone())
            };

            match load_frame(path, quality, zoom) {
                Ok(image) => {
                    let frame = Frame::from_image(image).with_orientation(orientation);
                    if let Some(sink) = sink {
                        if !sink.deliver(frame) {
                            debug!("Frame receiver gone, detaching sink");
                            state.write().sink = None;
                        }
                    }
                }
                Err(e) => warn!("Skipping unreadable frame {:?}: {}", path, e),
            }

            std::thread::sleep(interval.saturating_sub(started.elapsed()));
        }

        if !loop_playback {
            break;
        }
    }
}

/// Decode one frame, apply digital zoom and fit it to the quality preset
fn load_frame(path: &Path, quality: CameraQuality, zoom: f32) -> Result<RgbaImage, CaptureError> {
    let image = image::open(path)?.to_rgba8();
    Ok(shape_frame(image, quality, zoom))
}

fn shape_frame(image: RgbaImage, quality: CameraQuality, zoom: f32) -> RgbaImage {
    let (width, height) = image.dimensions();
    let (target_w, target_h) = fit_within(width, height, quality.max_dimensions());

    let zoomed = zoom > 1.0;
    if !zoomed && (target_w, target_h) == (width, height) {
        return image;
    }

    let source = if zoomed {
        let crop_w = ((width as f32 / zoom).round() as u32).max(1);
        let crop_h = ((height as f32 / zoom).round() as u32).max(1);
        let x = (width - crop_w) / 2;
        let y = (height - crop_h) / 2;
        imageops::crop_imm(&image, x, y, crop_w, crop_h).to_image()
    } else {
        image
    };

    imageops::resize(&source, target_w, target_h, imageops::FilterType::Triangle)
}

/// Scale (width, height) down to fit a landscape/portrait-agnostic bound
fn fit_within(width: u32, height: u32, bound: (u32, u32)) -> (u32, u32) {
    let long_bound = bound.0.max(bound.1) as f32;
    let short_bound = bound.0.min(bound.1) as f32;
    let long = width.max(height) as f32;
    let short = width.min(height) as f32;

    let scale = (long_bound / long).min(short_bound / short).min(1.0);
    if scale >= 1.0 {
        return (width, height);
    }
    (
        ((width as f32 * scale).round() as u32).max(1),
        ((height as f32 * scale).round() as u32).max(1),
    )
}
