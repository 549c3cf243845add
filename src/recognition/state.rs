//! Recognition lifecycle notifications

use crossbeam_channel::{unbounded, Receiver};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Per-frame lifecycle notification pushed to the handler
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecognitionState {
    /// The camera or scene is moving; OCR is not attempted
    SceneUnstable,
    /// A stable frame produced an OCR result that was counted
    Recognizing,
    /// A result reached the required confidence
    StablyRecognized { text: String },
    /// Nothing has been observed yet
    #[default]
    Unknown,
}

impl RecognitionState {
    /// Whether this notification ends the current recognition attempt
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecognitionState::StablyRecognized { .. })
    }
}

impl fmt::Display for RecognitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognitionState::Recognizing => write!(f, "Recognizing..."),
            RecognitionState::SceneUnstable => write!(f, "Scene Unstable"),
            RecognitionState::StablyRecognized { text } => write!(f, "Recognized {}", text),
            RecognitionState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Callback receiving lifecycle notifications.
///
/// Called on a dedicated notifier thread, one notification at a time and in
/// the order they were produced. A slow handler delays later notifications
/// but never frame processing.
pub type RecognitionHandler = Arc<dyn Fn(RecognitionState) + Send + Sync>;

/// A handler that forwards every notification into an unbounded channel
pub fn channel_handler() -> (RecognitionHandler, Receiver<RecognitionState>) {
    let (tx, rx) = unbounded();
    let handler: RecognitionHandler = Arc::new(move |state| {
        let _ = tx.send(state);
    });
    (handler, rx)
}
