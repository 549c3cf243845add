//! live-ocr - Stability-gated real-time text recognition
//!
//! Watches a camera feed, waits until the scene holds still, reads the text
//! inside a region of interest, and only reports a result once the same
//! text has been read often enough to be trusted.

pub mod app;
pub mod capture;
pub mod config;
pub mod error;
pub mod recognition;
pub mod vision;

pub use app::RealTimeEngine;
pub use config::AppConfig;
pub use recognition::{
    channel_handler, RecognitionHandler, RecognitionReliability, RecognitionState,
};
