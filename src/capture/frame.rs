//! Frame data structures for camera output

use image::{imageops, GrayImage, ImageBuffer, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Physical orientation of the device when a frame was captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceOrientation {
    Unknown,
    #[default]
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
    FaceUp,
    FaceDown,
}

/// Orientation applied to the camera output connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoOrientation {
    #[default]
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
}

impl VideoOrientation {
    /// Map a device orientation to the video orientation that keeps the
    /// preview upright. Landscape is mirrored because the sensor is mounted
    /// opposite to the device's notion of left/right. Flat and unknown
    /// orientations have no video equivalent.
    pub fn from_device(orientation: DeviceOrientation) -> Option<Self> {
        match orientation {
            DeviceOrientation::Portrait => Some(Self::Portrait),
            DeviceOrientation::PortraitUpsideDown => Some(Self::PortraitUpsideDown),
            DeviceOrientation::LandscapeLeft => Some(Self::LandscapeRight),
            DeviceOrientation::LandscapeRight => Some(Self::LandscapeLeft),
            _ => None,
        }
    }
}

impl From<VideoOrientation> for DeviceOrientation {
    fn from(orientation: VideoOrientation) -> Self {
        match orientation {
            VideoOrientation::Portrait => Self::Portrait,
            VideoOrientation::PortraitUpsideDown => Self::PortraitUpsideDown,
            VideoOrientation::LandscapeLeft => Self::LandscapeRight,
            VideoOrientation::LandscapeRight => Self::LandscapeLeft,
        }
    }
}

/// How the encoded pixels relate to the intended display orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageOrientation {
    #[default]
    Up,
    Down,
    Left,
    Right,
}

impl From<DeviceOrientation> for ImageOrientation {
    fn from(orientation: DeviceOrientation) -> Self {
        match orientation {
            DeviceOrientation::LandscapeLeft => Self::Left,
            DeviceOrientation::LandscapeRight => Self::Right,
            DeviceOrientation::PortraitUpsideDown => Self::Down,
            // Everything else is treated as portrait-up
            _ => Self::Up,
        }
    }
}

/// A single frame delivered by a camera source
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw RGBA pixel data
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Device orientation hint at capture time
    pub orientation: DeviceOrientation,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl Frame {
    /// Create a new frame from raw RGBA data
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            orientation: DeviceOrientation::default(),
            timestamp: Instant::now(),
        }
    }

    /// Create a frame that takes ownership of a decoded image
    pub fn from_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height)
    }

    /// Attach a device orientation hint
    pub fn with_orientation(mut self, orientation: DeviceOrientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Borrow the pixel data as an image view.
    /// Returns None if the buffer is shorter than the dimensions require.
    pub fn as_image(&self) -> Option<ImageBuffer<Rgba<u8>, &[u8]>> {
        ImageBuffer::from_raw(self.width, self.height, self.data.as_slice())
    }

    /// Luminance plane of the frame (BT.601 weights)
    pub fn luma(&self) -> Option<GrayImage> {
        self.as_image().map(|view| imageops::grayscale(&view))
    }

    /// Copy of the frame rotated so that its content is upright
    pub fn upright_image(&self) -> Option<RgbaImage> {
        let view = self.as_image()?;
        let image = match ImageOrientation::from(self.orientation) {
            ImageOrientation::Up => RgbaImage::from_raw(self.width, self.height, self.data.clone())?,
            ImageOrientation::Down => imageops::rotate180(&view),
            ImageOrientation::Left => imageops::rotate270(&view),
            ImageOrientation::Right => imageops::rotate90(&view),
        };
        Some(image)
    }
}
