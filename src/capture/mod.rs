//! Camera Capture Layer
//!
//! The recognition core never owns a camera. It talks to one through the
//! [`CameraSource`] capability, optionally extended with [`Zoomable`], and
//! receives frames through a [`FrameSink`] handle the camera holds. The sink
//! is only a channel sender, so the camera never keeps the engine alive.

pub mod frame;
pub mod replay;

use crossbeam_channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::CaptureError;

pub use frame::{DeviceOrientation, Frame, ImageOrientation, VideoOrientation};
pub use replay::{ReplayConfig, ReplaySource};

/// Camera output quality preset.
///
/// Only affects what the user sees in the preview; anything above
/// `Medium` does not improve recognition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum CameraQuality {
    Low,
    #[default]
    Medium,
    High,
    Hd1920,
}

impl CameraQuality {
    /// Largest (width, height) a frame may have under this preset
    pub fn max_dimensions(&self) -> (u32, u32) {
        match self {
            CameraQuality::Low => (352, 288),
            CameraQuality::Medium => (480, 360),
            CameraQuality::High => (1280, 720),
            CameraQuality::Hd1920 => (1920, 1080),
        }
    }
}

/// Size of the surface the preview is drawn into.
///
/// This is the reference coordinate space for the region of interest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewSurface {
    pub width: f32,
    pub height: f32,
}

impl PreviewSurface {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Non-owning handle a camera uses to deliver frames to the engine
#[derive(Debug, Clone)]
pub struct FrameSink {
    sender: Sender<Frame>,
}

impl FrameSink {
    pub fn new(sender: Sender<Frame>) -> Self {
        Self { sender }
    }

    /// Hand a frame to the processor without blocking.
    ///
    /// A frame that arrives while the processor is still busy is dropped.
    /// Returns false once the processing side has gone away.
    pub fn deliver(&self, frame: Frame) -> bool {
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                trace!("Processor busy, dropping late frame");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Something that can run a capture session and feed a preview
pub trait CameraSource: Send {
    /// Start the capture session
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Stop the capture session
    fn stop(&mut self) -> Result<(), CaptureError>;

    /// Whether frames are currently being produced
    fn is_running(&self) -> bool;

    /// Attach the preview to a surface of the given size
    fn bind_preview(&mut self, surface: PreviewSurface);

    /// Register (or clear) the receiver of captured frames
    fn set_frame_sink(&mut self, sink: Option<FrameSink>);

    /// Current quality preset
    fn quality(&self) -> CameraQuality;

    /// Change the quality preset; the session is reconfigured immediately
    fn set_quality(&mut self, quality: CameraQuality) -> Result<(), CaptureError>;

    /// Apply a new output orientation
    fn set_video_orientation(&mut self, orientation: VideoOrientation);

    /// Move the focus point (preview coordinates). No-op for fixed-focus sources.
    fn set_focus_point(&mut self, _point: (f32, f32)) {}

    /// Runtime query for the zoom capability
    fn as_zoomable(&self) -> Option<&dyn Zoomable> {
        None
    }

    /// Mutable runtime query for the zoom capability
    fn as_zoomable_mut(&mut self) -> Option<&mut dyn Zoomable> {
        None
    }
}

/// Optional zoom capability of a camera source
pub trait Zoomable {
    fn zoom_factor(&self) -> f32;

    /// Requests outside the exclusive (min, max) range are ignored
    fn set_zoom_factor(&mut self, factor: f32);

    fn min_zoom_factor(&self) -> f32 {
        1.0
    }

    fn max_zoom_factor(&self) -> f32;
}
