//! Error types for the perception and capture capabilities
//!
//! None of these cross the per-frame boundary: the recognition engine
//! logs them and treats the frame as carrying no new information.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to register two frames against each other
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("frame size changed from {reference:?} to {current:?}")]
    DimensionMismatch {
        reference: (u32, u32),
        current: (u32, u32),
    },
    #[error("frame {width}x{height} is too small to register")]
    TooSmall { width: u32, height: u32 },
    #[error("no distinct match within the search range")]
    NoMatch,
}

/// Failure to cut the region of interest out of a frame
#[derive(Debug, Error)]
pub enum CropError {
    #[error("no region of interest configured")]
    NoRegion,
    #[error("region of interest has no area")]
    EmptyRegion,
    #[error("region of interest lies outside the frame")]
    OutOfBounds,
    #[error("frame buffer does not match its dimensions")]
    InvalidFrame,
}

/// Failure of a single OCR call
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image encode error: {0}")]
    Image(#[from] image::ImageError),
    #[error("OCR engine exited with {status}: {stderr}")]
    EngineFailed { status: String, stderr: String },
    #[error("OCR engine produced no text")]
    NoText,
}

/// Failure in a camera source
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),
    #[error("no frames found in {0}")]
    NoFrames(PathBuf),
    #[error("capture thread panicked")]
    ThreadPanicked,
}
