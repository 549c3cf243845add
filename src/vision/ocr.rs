//! OCR (Optical Character Recognition) module
//!
//! The engine treats OCR as an opaque capability: image in, text or failure
//! out. The bundled backend shells out to the Tesseract command-line tool
//! with a single language configuration.

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, trace};

use crate::error::OcrError;

/// Capability: recognize the text in an image
pub trait TextRecognizer: Send {
    fn recognize(&mut self, image: &RgbaImage) -> Result<String, OcrError>;
}

/// Tesseract CLI settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseractConfig {
    /// Path or name of the `tesseract` executable
    pub tesseract_path: PathBuf,
    /// Language pack, e.g. "eng" or "jpn"
    pub language: String,
    /// Page segmentation mode (7 = single text line)
    pub page_segmentation: u32,
    /// Restrict output to these characters
    pub char_whitelist: Option<String>,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            tesseract_path: PathBuf::from("tesseract"),
            language: "eng".to_string(),
            page_segmentation: 7,
            char_whitelist: None,
        }
    }
}

/// OCR backend running the Tesseract executable once per image
#[derive(Debug, Clone, Default)]
pub struct TesseractCli {
    config: TesseractConfig,
}

impl TesseractCli {
    pub fn new(config: TesseractConfig) -> Self {
        Self { config }
    }

    pub fn language(&self) -> &str {
        &self.config.language
    }

    fn command(&self, image_path: &std::path::Path) -> Command {
        let mut command = Command::new(&self.config.tesseract_path);
        command
            .arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.config.language)
            .arg("--psm")
            .arg(self.config.page_segmentation.to_string());
        if let Some(whitelist) = &self.config.char_whitelist {
            command
                .arg("-c")
                .arg(format!("tessedit_char_whitelist={}", whitelist));
        }
        command
    }
}

impl TextRecognizer for TesseractCli {
    fn recognize(&mut self, image: &RgbaImage) -> Result<String, OcrError> {
        let mut file = tempfile::Builder::new()
            .prefix("live-ocr-")
            .suffix(".png")
            .tempfile()?;
        image.write_to(&mut file, image::ImageFormat::Png)?;
        file.flush()?;

        let output = self.command(file.path()).output()?;
        if !output.status.success() {
            return Err(OcrError::EngineFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let raw = String::from_utf8_lossy(&output.stdout);
        trace!("Tesseract raw output: {:?}", raw);

        let text = normalize_text(&raw);
        if text.is_empty() {
            return Err(OcrError::NoText);
        }
        debug!("Tesseract recognized {:?}", text);
        Ok(text)
    }
}

/// Collapse runs of whitespace (including newlines) into single spaces
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
