//! Translational image registration
//!
//! Estimates the global 2D shift between two luminance frames with a
//! coarse-to-fine SAD (sum of absolute differences) search over an image
//! pyramid. The coarsest level is searched exhaustively across the whole
//! configured range, finer levels only refine around the estimate.
//!
//! A shift is only reported when it is a clear match. Motion beyond the
//! search range produces no distinct minimum (or one pinned to the range
//! border) and is reported as [`RegistrationError::NoMatch`] instead of a
//! misleading small shift.

use image::{imageops, GrayImage};
use serde::{Deserialize, Serialize};

use super::stability::Displacement;
use crate::error::RegistrationError;

/// Frames narrower than this (or shorter on either side) cannot be registered
const MIN_SIDE: u32 = 16;

/// Pyramid levels are halved while they stay at least this wide
const MIN_LEVEL_WIDTH: u32 = 32;

/// Search radius around the estimate carried down from a coarser level
const REFINE_RADIUS: i32 = 2;

/// The best score must be below this fraction of the average score
const MATCH_RATIO: f32 = 0.5;

/// Average coarse-level difference below which the scene has no usable texture
const FLAT_SCENE_LEVEL: f32 = 2.0;

/// Capability: best-fit translation between a reference and a current frame
pub trait ImageRegistration: Send {
    /// Returns how far the content moved from `reference` to `current`,
    /// in pixels of the given images.
    fn register_translation(
        &mut self,
        reference: &GrayImage,
        current: &GrayImage,
    ) -> Result<Displacement, RegistrationError>;
}

/// Block matcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Width frames are downsampled to before matching
    pub working_width: u32,
    /// Largest shift measured along each axis, in frame pixels
    pub max_shift: f32,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            working_width: 160,
            max_shift: 120.0,
        }
    }
}

/// Whole-frame pyramid SAD block matcher
#[derive(Debug, Clone, Default)]
pub struct BlockMatchRegistration {
    config: RegistrationConfig,
}

impl BlockMatchRegistration {
    pub fn new(config: RegistrationConfig) -> Self {
        Self { config }
    }
}

impl ImageRegistration for BlockMatchRegistration {
    fn register_translation(
        &mut self,
        reference: &GrayImage,
        current: &GrayImage,
    ) -> Result<Displacement, RegistrationError> {
        if reference.dimensions() != current.dimensions() {
            return Err(RegistrationError::DimensionMismatch {
                reference: reference.dimensions(),
                current: current.dimensions(),
            });
        }

        let (width, height) = reference.dimensions();
        if width < MIN_SIDE || height < MIN_SIDE {
            return Err(RegistrationError::TooSmall { width, height });
        }

        let working_width = self.config.working_width.max(MIN_LEVEL_WIDTH);
        let reference_levels = pyramid(downsample(reference, working_width));
        let current_levels = pyramid(downsample(current, working_width));

        let (Some(coarse_ref), Some(coarse_cur)) = (reference_levels.last(), current_levels.last())
        else {
            return Err(RegistrationError::TooSmall { width, height });
        };

        let (coarse_w, coarse_h) = coarse_ref.dimensions();
        let coarse_scale = width as f32 / coarse_w as f32;
        let range = ((self.config.max_shift / coarse_scale).ceil() as i32)
            .min((coarse_w.min(coarse_h) / 3) as i32)
            .max(1);

        let search = exhaustive_search(coarse_ref, coarse_cur, range);
        if search.mean_score < FLAT_SCENE_LEVEL {
            // Featureless: any shift fits equally well
            return Ok(Displacement::default());
        }
        if search.shift.0.abs() == range || search.shift.1.abs() == range {
            return Err(RegistrationError::NoMatch);
        }
        if search.score > MATCH_RATIO * search.mean_score {
            return Err(RegistrationError::NoMatch);
        }

        let mut shift = search.shift;
        let mut level_dims = (coarse_w, coarse_h);
        for (level_ref, level_cur) in reference_levels.iter().zip(&current_levels).rev().skip(1) {
            let (w, h) = level_ref.dimensions();
            let guess = (
                (shift.0 as f32 * w as f32 / level_dims.0 as f32).round() as i32,
                (shift.1 as f32 * h as f32 / level_dims.1 as f32).round() as i32,
            );
            shift = refine(level_ref, level_cur, guess, REFINE_RADIUS);
            level_dims = (w, h);
        }

        Ok(Displacement::new(
            shift.0 as f32 * width as f32 / level_dims.0 as f32,
            shift.1 as f32 * height as f32 / level_dims.1 as f32,
        ))
    }
}

/// Result of a search over candidate shifts
#[derive(Debug, Clone, Copy)]
struct ShiftMatch {
    shift: (i32, i32),
    score: f32,
    /// Average score over every candidate searched
    mean_score: f32,
}

fn downsample(image: &GrayImage, working_width: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width <= working_width {
        return image.clone();
    }
    let working_height = ((height as f32 * working_width as f32 / width as f32).round() as u32)
        .max(MIN_SIDE);
    imageops::resize(
        image,
        working_width,
        working_height,
        imageops::FilterType::Triangle,
    )
}

/// Finest level first
fn pyramid(base: GrayImage) -> Vec<GrayImage> {
    let mut levels = vec![base];
    while let Some(last) = levels.last() {
        let (w, h) = last.dimensions();
        if w / 2 < MIN_LEVEL_WIDTH || h / 2 < MIN_SIDE {
            break;
        }
        let next = imageops::resize(last, w / 2, h / 2, imageops::FilterType::Triangle);
        levels.push(next);
    }
    levels
}

/// Every shift within `range`. Ties resolve toward the zero shift, which is checked first.
fn exhaustive_search(reference: &GrayImage, current: &GrayImage, range: i32) -> ShiftMatch {
    let mut best = (0, 0);
    let mut best_score = mean_abs_diff(reference, current, 0, 0);
    let mut total = best_score as f64;
    let mut candidates = 1u32;

    for dy in -range..=range {
        for dx in -range..=range {
            if dx == 0 && dy == 0 {
                continue;
            }
            let score = mean_abs_diff(reference, current, dx, dy);
            total += score as f64;
            candidates += 1;
            if score < best_score {
                best_score = score;
                best = (dx, dy);
            }
        }
    }

    ShiftMatch {
        shift: best,
        score: best_score,
        mean_score: (total / candidates as f64) as f32,
    }
}

/// Search a small window around `center`, which wins ties
fn refine(reference: &GrayImage, current: &GrayImage, center: (i32, i32), radius: i32) -> (i32, i32) {
    let mut best = center;
    let mut best_score = mean_abs_diff(reference, current, center.0, center.1);

    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let candidate = (center.0 + dx, center.1 + dy);
            if candidate == center {
                continue;
            }
            let score = mean_abs_diff(reference, current, candidate.0, candidate.1);
            if score < best_score {
                best_score = score;
                best = candidate;
            }
        }
    }
    best
}

/// Mean |reference(x, y) - current(x + dx, y + dy)| over the overlap
fn mean_abs_diff(reference: &GrayImage, current: &GrayImage, dx: i32, dy: i32) -> f32 {
    let (w, h) = reference.dimensions();
    let (w, h) = (w as i32, h as i32);
    let ref_px = reference.as_raw();
    let cur_px = current.as_raw();

    let x0 = 0.max(-dx);
    let x1 = w.min(w - dx);
    let y0 = 0.max(-dy);
    let y1 = h.min(h - dy);
    if x1 <= x0 || y1 <= y0 {
        return f32::MAX;
    }

    let mut sum: u64 = 0;
    for y in y0..y1 {
        let r_row = (y * w) as usize;
        let c_row = ((y + dy) * w) as usize;
        for x in x0..x1 {
            let r = ref_px[r_row + x as usize] as i32;
            let c = cur_px[c_row + (x + dx) as usize] as i32;
            sum += r.abs_diff(c) as u64;
        }
    }

    let area = ((x1 - x0) * (y1 - y0)) as f32;
    sum as f32 / area
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Luma;

    /// Random blocks of `cell` pixels, with content moved by `offset`
    pub(crate) fn textured(width: u32, height: u32, cell: i32, offset: (i32, i32)) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let cx = (x as i32 - offset.0).div_euclid(cell);
            let cy = (y as i32 - offset.1).div_euclid(cell);
            let h = (cx.wrapping_mul(73_856_093) ^ cy.wrapping_mul(19_349_663)) as u32;
            Luma([(h.wrapping_mul(0x9E37_79B9) >> 24) as u8])
        })
    }

    #[test]
    fn test_identical_frames_have_zero_shift() {
        let mut registration = BlockMatchRegistration::default();
        let frame = textured(64, 48, 4, (0, 0));
        let d = registration.register_translation(&frame, &frame).unwrap();
        assert_eq!(d, Displacement::new(0.0, 0.0));
    }

    #[test]
    fn test_detects_known_shift() {
        let mut registration = BlockMatchRegistration::default();
        let reference = textured(64, 48, 8, (0, 0));
        let current = textured(64, 48, 8, (3, -2));
        let d = registration.register_translation(&reference, &current).unwrap();
        assert!((d.x - 3.0).abs() < 0.01, "dx = {}", d.x);
        assert!((d.y + 2.0).abs() < 0.01, "dy = {}", d.y);
    }

    #[test]
    fn test_large_pan_measured_in_frame_pixels() {
        let mut registration = BlockMatchRegistration::default();
        let reference = textured(480, 360, 24, (0, 0));
        let current = textured(480, 360, 24, (60, 60));
        let d = registration.register_translation(&reference, &current).unwrap();
        assert!((d.x - 60.0).abs() <= 3.0, "dx = {}", d.x);
        assert!((d.y - 60.0).abs() <= 3.0, "dy = {}", d.y);
        assert!(d.manhattan() >= 100.0);
    }

    #[test]
    fn test_motion_beyond_range_is_no_match() {
        let mut registration = BlockMatchRegistration::default();
        let reference = textured(480, 360, 24, (0, 0));
        let current = textured(480, 360, 24, (170, -150));
        assert!(matches!(
            registration.register_translation(&reference, &current),
            Err(RegistrationError::NoMatch)
        ));
    }

    #[test]
    fn test_unrelated_frames_are_no_match() {
        let mut registration = BlockMatchRegistration::default();
        let reference = textured(320, 240, 16, (0, 0));
        let current = GrayImage::from_fn(320, 240, |x, y| {
            Luma([((x / 16 * 37 + y / 16 * 101) % 7 * 36) as u8])
        });
        assert!(registration.register_translation(&reference, &current).is_err());
    }

    #[test]
    fn test_flat_frames_prefer_zero_shift() {
        let mut registration = BlockMatchRegistration::default();
        let flat = GrayImage::from_pixel(40, 40, Luma([128]));
        let d = registration.register_translation(&flat, &flat).unwrap();
        assert_eq!(d, Displacement::default());
    }

    #[test]
    fn test_dimension_mismatch_fails() {
        let mut registration = BlockMatchRegistration::default();
        let a = GrayImage::new(40, 40);
        let b = GrayImage::new(40, 41);
        assert!(matches!(
            registration.register_translation(&a, &b),
            Err(RegistrationError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_tiny_frames_fail() {
        let mut registration = BlockMatchRegistration::default();
        let a = GrayImage::new(8, 8);
        assert!(matches!(
            registration.register_translation(&a, &a),
            Err(RegistrationError::TooSmall { .. })
        ));
    }

    #[test]
    fn test_pyramid_levels_halve() {
        let levels = pyramid(GrayImage::new(160, 120));
        let dims: Vec<_> = levels.iter().map(|l| l.dimensions()).collect();
        assert_eq!(dims, vec![(160, 120), (80, 60), (40, 30)]);
    }
}
