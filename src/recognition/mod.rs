//! Recognition Layer
//!
//! Turns a stream of frames into lifecycle notifications: stability gating,
//! OCR on the region of interest, and confidence voting over the results.

pub mod engine;
pub mod queue;
pub mod state;

pub use engine::{EngineControls, EngineSettings, RecognitionEngine};
pub use queue::{RecognitionQueue, RecognitionReliability};
pub use state::{channel_handler, RecognitionHandler, RecognitionState};
