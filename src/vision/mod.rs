//! Vision Layer
//!
//! Per-frame perception capabilities used by the recognition engine:
//! - scene stability from frame-to-frame registration
//! - region-of-interest cropping in preview coordinates
//! - OCR preprocessing and the OCR backend itself

pub mod crop;
pub mod ocr;
pub mod ocr_preprocess;
pub mod registration;
pub mod stability;

pub use crop::{ImageCropper, PreviewCropper, RegionOfInterest, VideoGravity};
pub use ocr::{normalize_text, TesseractCli, TesseractConfig, TextRecognizer};
pub use ocr_preprocess::{apply_preprocessing, OcrPreprocessing};
pub use registration::{BlockMatchRegistration, ImageRegistration, RegistrationConfig};
pub use stability::{
    Displacement, StabilityConfig, StabilityDetector, StabilityState, TranspositionHistory,
};
