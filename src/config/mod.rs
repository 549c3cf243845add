//! Application Configuration
//!
//! User settings stored in TOML format.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::capture::{CameraQuality, DeviceOrientation, ReplayConfig};
use crate::recognition::EngineSettings;
use crate::vision::{OcrPreprocessing, RegionOfInterest, TesseractConfig};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Recognition engine settings
    pub engine: EngineSettings,
    /// Camera settings
    pub capture: CaptureSettings,
    /// OCR backend settings
    pub ocr: OcrSettings,
    /// Default region of interest, in preview coordinates
    pub region: Option<RegionOfInterest>,
}

/// Capture-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Directory of frames to replay
    pub frames_dir: Option<PathBuf>,
    /// Maximum capture FPS
    pub max_fps: u32,
    /// Output quality preset
    pub camera_quality: CameraQuality,
    /// Restart from the first frame when the directory is exhausted
    pub loop_playback: bool,
    /// Orientation the device is held in
    pub orientation: DeviceOrientation,
    /// Upper bound for digital zoom
    pub max_zoom: f32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            frames_dir: None,
            max_fps: 30,
            camera_quality: CameraQuality::default(),
            loop_playback: false,
            orientation: DeviceOrientation::Portrait,
            max_zoom: 4.0,
        }
    }
}

impl CaptureSettings {
    /// Replay source settings for `directory`
    pub fn replay_config(&self, directory: PathBuf) -> ReplayConfig {
        ReplayConfig {
            directory,
            max_fps: self.max_fps,
            loop_playback: self.loop_playback,
            quality: self.camera_quality,
            orientation: self.orientation,
            max_zoom: self.max_zoom,
        }
    }
}

/// OCR-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Path or name of the `tesseract` executable
    pub tesseract_path: PathBuf,
    /// Language pack
    pub language: String,
    /// Tesseract page segmentation mode
    pub page_segmentation: u32,
    /// Restrict recognized characters
    pub char_whitelist: Option<String>,
    /// Image filters applied before OCR
    pub preprocessing: OcrPreprocessing,
}

impl Default for OcrSettings {
    fn default() -> Self {
        let tesseract = TesseractConfig::default();
        Self {
            tesseract_path: tesseract.tesseract_path,
            language: tesseract.language,
            page_segmentation: tesseract.page_segmentation,
            char_whitelist: tesseract.char_whitelist,
            preprocessing: OcrPreprocessing::default(),
        }
    }
}

impl OcrSettings {
    pub fn tesseract_config(&self) -> TesseractConfig {
        TesseractConfig {
            tesseract_path: self.tesseract_path.clone(),
            language: self.language.clone(),
            page_segmentation: self.page_segmentation,
            char_whitelist: self.char_whitelist.clone(),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Get the configuration directory, creating it if needed
pub fn config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "liveocr", "LiveOcr")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

/// Default location of the configuration file
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}
