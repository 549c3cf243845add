//! Image preprocessing filters for OCR optimization
//!
//! Optional enhancements applied to the cropped region before it is handed
//! to the OCR engine. Small crops benefit most from upscaling; low-contrast
//! text from binarization.

use image::{imageops, DynamicImage, GrayImage, Luma, RgbaImage};
use imageproc::contrast::otsu_level;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Preprocessing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrPreprocessing {
    /// Master switch
    pub enabled: bool,
    /// Integer upscale factor (1 = unchanged)
    pub scale: u32,
    /// Contrast factor around mid-gray (1.0 = unchanged)
    pub contrast: f32,
    /// Convert to grayscale
    pub grayscale: bool,
    /// Threshold at the Otsu level (implies grayscale)
    pub binarize: bool,
    /// Invert colors, for light text on dark backgrounds
    pub invert: bool,
}

impl Default for OcrPreprocessing {
    fn default() -> Self {
        Self {
            enabled: false,
            scale: 1,
            contrast: 1.0,
            grayscale: true,
            binarize: false,
            invert: false,
        }
    }
}

/// Apply the enabled filters to a cropped region
pub fn apply_preprocessing(image: RgbaImage, settings: &OcrPreprocessing) -> RgbaImage {
    if !settings.enabled {
        return image;
    }

    debug!(
        "OCR preprocessing: scale={}, contrast={}, grayscale={}, binarize={}, invert={}",
        settings.scale, settings.contrast, settings.grayscale, settings.binarize, settings.invert
    );

    // Upscale first so later filters work on the final resolution
    let mut result = if settings.scale > 1 {
        let (w, h) = image.dimensions();
        imageops::resize(
            &image,
            w * settings.scale,
            h * settings.scale,
            imageops::FilterType::Triangle,
        )
    } else {
        image
    };

    if (settings.contrast - 1.0).abs() > 0.01 {
        apply_contrast(&mut result, settings.contrast);
    }

    if settings.grayscale || settings.binarize {
        let mut gray = imageops::grayscale(&result);
        if settings.binarize {
            binarize(&mut gray);
        }
        result = DynamicImage::ImageLuma8(gray).to_rgba8();
    }

    if settings.invert {
        imageops::invert(&mut result);
    }

    result
}

/// Stretch color channels around mid-gray; alpha is left alone
fn apply_contrast(image: &mut RgbaImage, factor: f32) {
    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut().take(3) {
            let adjusted = ((*channel as f32 - 128.0) * factor + 128.0).clamp(0.0, 255.0);
            *channel = adjusted as u8;
        }
    }
}

/// Threshold at the Otsu level: text and background become pure black/white
fn binarize(gray: &mut GrayImage) {
    let level = otsu_level(gray);
    for pixel in gray.pixels_mut() {
        *pixel = Luma([if pixel.0[0] > level { 255 } else { 0 }]);
    }
}
