//! Region-of-interest cropping
//!
//! The region is defined in preview coordinates (the surface the user sees),
//! not in frame pixels. The cropper maps it through the preview's video
//! gravity into the frame before cutting.

use image::{imageops, RgbaImage};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::capture::PreviewSurface;
use crate::error::CropError;

/// Rectangle in preview coordinates: (x, y) is the top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionOfInterest {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl RegionOfInterest {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Center point, used as the camera focus point
    pub fn mid_point(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

impl FromStr for RegionOfInterest {
    type Err = String;

    /// Parses "x,y,width,height"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<f32> = s
            .split(',')
            .map(|p| p.trim().parse::<f32>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("invalid region '{}': {}", s, e))?;

        match parts.as_slice() {
            [x, y, w, h] => Ok(Self::new(*x, *y, *w, *h)),
            _ => Err(format!("expected x,y,width,height, got '{}'", s)),
        }
    }
}

/// How frames are laid out inside the preview surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoGravity {
    /// Scale uniformly to cover the surface, cropping overflow
    #[default]
    ResizeAspectFill,
    /// Scale uniformly to fit inside the surface, letterboxing
    ResizeAspect,
    /// Stretch to the surface
    Resize,
}

/// Capability: cut a preview-space region out of a frame image
pub trait ImageCropper: Send {
    fn crop(
        &self,
        image: &RgbaImage,
        region: &RegionOfInterest,
        preview: &PreviewSurface,
    ) -> Result<RgbaImage, CropError>;
}

/// Cropper that honors the preview's video gravity
#[derive(Debug, Clone, Copy, Default)]
pub struct PreviewCropper {
    gravity: VideoGravity,
}

impl PreviewCropper {
    pub fn new(gravity: VideoGravity) -> Self {
        Self { gravity }
    }

    /// Map a preview-space rectangle to frame pixels (x, y, width, height),
    /// clipped to the frame
    pub fn map_to_image(
        &self,
        region: &RegionOfInterest,
        image_size: (u32, u32),
        preview: &PreviewSurface,
    ) -> Result<(u32, u32, u32, u32), CropError> {
        if !region.has_area() {
            return Err(CropError::EmptyRegion);
        }
        if preview.width <= 0.0 || preview.height <= 0.0 || image_size.0 == 0 || image_size.1 == 0 {
            return Err(CropError::OutOfBounds);
        }

        let (iw, ih) = (image_size.0 as f32, image_size.1 as f32);
        let (sx, sy) = match self.gravity {
            VideoGravity::ResizeAspectFill => {
                let s = (preview.width / iw).max(preview.height / ih);
                (s, s)
            }
            VideoGravity::ResizeAspect => {
                let s = (preview.width / iw).min(preview.height / ih);
                (s, s)
            }
            VideoGravity::Resize => (preview.width / iw, preview.height / ih),
        };

        // Offset of the displayed frame inside the surface (negative when cropped)
        let offset_x = (preview.width - iw * sx) / 2.0;
        let offset_y = (preview.height - ih * sy) / 2.0;

        let left = ((region.x - offset_x) / sx).max(0.0);
        let top = ((region.y - offset_y) / sy).max(0.0);
        let right = ((region.x + region.width - offset_x) / sx).min(iw);
        let bottom = ((region.y + region.height - offset_y) / sy).min(ih);

        if right - left < 1.0 || bottom - top < 1.0 {
            return Err(CropError::OutOfBounds);
        }

        // Snap float noise from the scale round trip before widening to whole pixels
        const SNAP: f32 = 1e-3;
        let x = (left + SNAP).floor() as u32;
        let y = (top + SNAP).floor() as u32;
        let width = (((right - SNAP).ceil() as u32).min(image_size.0)).saturating_sub(x);
        let height = (((bottom - SNAP).ceil() as u32).min(image_size.1)).saturating_sub(y);
        Ok((x, y, width, height))
    }
}

impl ImageCropper for PreviewCropper {
    fn crop(
        &self,
        image: &RgbaImage,
        region: &RegionOfInterest,
        preview: &PreviewSurface,
    ) -> Result<RgbaImage, CropError> {
        let (x, y, width, height) = self.map_to_image(region, image.dimensions(), preview)?;
        Ok(imageops::crop_imm(image, x, y, width, height).to_image())
    }
}
